//! Network availability monitor.
//!
//! Holds the process-wide "are we online" flag every sync service reads
//! before contacting the remote store. Transitions are published for
//! diagnostics only; nothing retries on them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

/// An edge in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Connectivity {
    BecameOnline,
    BecameOffline,
}

/// Tracks reported connectivity.
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
    transitions: broadcast::Sender<Connectivity>,
}

impl NetworkMonitor {
    /// Create a monitor seeded with the currently reported connectivity.
    pub fn new(initially_online: bool) -> Self {
        let (transitions, _) = broadcast::channel(16);
        Self {
            online: AtomicBool::new(initially_online),
            transitions,
        }
    }

    pub fn new_shared(initially_online: bool) -> Arc<Self> {
        Arc::new(Self::new(initially_online))
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_offline(&self) -> bool {
        !self.is_online()
    }

    /// Record reported connectivity.
    ///
    /// Returns true if this was a transition. Repeating the current state is
    /// a no-op and publishes nothing.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::SeqCst) == online {
            return false;
        }

        let transition = if online {
            tracing::info!("Network became available");
            Connectivity::BecameOnline
        } else {
            tracing::warn!("Network became unavailable, switching to offline mode");
            Connectivity::BecameOffline
        };

        // No receivers is fine
        let _ = self.transitions.send(transition);
        true
    }

    /// Subscribe to future transitions.
    pub fn transitions(&self) -> broadcast::Receiver<Connectivity> {
        self.transitions.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
