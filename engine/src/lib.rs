//! # BandSync Engine
//!
//! Pure data layer for the BandSync client sync services.
//!
//! This crate knows what a band's events, tasks, members and setlists look like, how
//! they are written to and read from the remote document store, and how the
//! in-memory list for one entity kind is kept in order. It performs no IO:
//! the gateway, the local cache and network monitoring live in
//! `bandsync-sync`.
//!
//! ## Core Concepts
//!
//! ### Entities
//!
//! Each synced kind implements [`Entity`]: a serde struct with a store-issued
//! ID, a group scope and an ordering key. Kinds ordered by a date also
//! implement [`Dated`].
//!
//! ### Schemas
//!
//! An [`EntitySchema`] lists the fields a kind writes, which are required,
//! and how an unset optional field is represented remotely ([`UnsetPolicy`]).
//! Dates become [`StoreTimestamp`]s on the way out and come back as
//! `chrono::DateTime<Utc>`.
//!
//! ### Sorted lists
//!
//! [`SortedRecords`] is the authoritative in-memory list: always ascending by
//! ordering key, with the derived date and category queries the UI needs.
//!
//! ### Cache entries
//!
//! [`CacheEntry`] is the persisted offline copy of one scope's list.
//!
//! ## Quick Start
//!
//! ```rust
//! use bandsync_engine::{Document, Entity, SortedRecords, Task, WriteMode};
//! use chrono::{TimeZone, Utc};
//!
//! let task = Task::new("Rehearsal", Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap(), "G1");
//!
//! // Encode for the store; blank optional fields are left out.
//! let fields = task.to_fields(WriteMode::Create).unwrap();
//! assert!(fields.contains_key("dueDate"));
//!
//! // Decode what the store hands back.
//! let stored = Task::from_document(&Document::new("t1", fields)).unwrap();
//! assert_eq!(stored.id.as_deref(), Some("t1"));
//!
//! let mut list = SortedRecords::new();
//! list.insert(stored);
//! assert!(list.is_sorted());
//! ```

pub mod collection;
pub mod document;
pub mod error;
pub mod models;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod timestamp;

// Re-export main types at crate root
pub use collection::SortedRecords;
pub use document::{Document, Fields};
pub use error::Error;
pub use models::{
    Event, EventStatus, EventType, Group, Member, Setlist, Song, Task, TaskPriority, UserRole,
    GROUPS_COLLECTION,
};
pub use record::{Dated, Entity};
pub use schema::{EntitySchema, FieldDef, FieldType, UnsetPolicy, WriteMode};
pub use snapshot::{CacheEntry, CACHE_FORMAT_VERSION};
pub use timestamp::StoreTimestamp;

/// Type aliases for clarity
pub type RecordId = String;
pub type GroupId = String;
pub type CollectionName = String;
