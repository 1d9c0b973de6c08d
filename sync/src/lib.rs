//! # BandSync Sync
//!
//! Client-side sync services for a band's events, tasks, members and setlists.
//!
//! Each [`EntitySyncService`] keeps the list of one entity kind for the
//! current group, talks to the remote document store through a
//! [`RemoteGateway`], falls back to a [`LocalCache`] when the
//! [`NetworkMonitor`] reports the device offline, and pushes every list
//! replacement to its subscribers. [`GroupDirectory`] handles group
//! membership.
//!
//! The `bandsync` binary hosts one [`SyncContext`] behind a small HTTP and
//! WebSocket API (see [`routes`]).

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod groups;
pub mod handlers;
pub mod network;
pub mod routes;
pub mod service;
pub mod subscription;

use std::sync::Arc;

pub use cache::{CacheError, FileCache, LocalCache, MemoryCache};
pub use config::{Config, ConfigError};
pub use context::SyncContext;
pub use gateway::{FieldQuery, GatewayError, MemoryGateway, PgGateway, QueryStream, RemoteGateway};
pub use groups::{GroupDirectory, GroupError};
pub use network::{Connectivity, NetworkMonitor};
pub use service::{EntitySyncService, SyncError, SyncOptions, SyncStatus};
pub use subscription::{Snapshot, Subscription};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<SyncContext>,
}

impl AppState {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self { context }
    }
}
