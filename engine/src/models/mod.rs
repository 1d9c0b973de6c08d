//! Record kinds synced by BandSync.

mod event;
mod group;
mod member;
mod setlist;
mod task;

pub use event::{Event, EventStatus, EventType};
pub use group::{Group, GROUPS_COLLECTION, GROUP_NAME_MAX, GROUP_NAME_MIN};
pub use member::{Member, UserRole};
pub use setlist::{Setlist, Song};
pub use task::{Task, TaskPriority};
