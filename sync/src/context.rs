//! Wiring of the sync services.
//!
//! A [`SyncContext`] holds one service per entity kind plus the group
//! directory, all sharing one gateway, cache and network monitor. Build one
//! per process (or per test).

use std::sync::Arc;

use bandsync_engine::{Event, Member, Setlist, Task};

use crate::cache::LocalCache;
use crate::gateway::RemoteGateway;
use crate::groups::GroupDirectory;
use crate::network::NetworkMonitor;
use crate::service::{EntitySyncService, SyncOptions};

#[derive(Debug)]
pub struct SyncContext {
    pub network: Arc<NetworkMonitor>,
    pub events: Arc<EntitySyncService<Event>>,
    pub tasks: Arc<EntitySyncService<Task>>,
    pub members: Arc<EntitySyncService<Member>>,
    pub setlists: Arc<EntitySyncService<Setlist>>,
    pub groups: GroupDirectory,
}

impl SyncContext {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        cache: Arc<dyn LocalCache>,
        network: Arc<NetworkMonitor>,
        options: SyncOptions,
    ) -> Self {
        let events = EntitySyncService::new(
            gateway.clone(),
            cache.clone(),
            network.clone(),
            options.clone(),
        );
        let tasks = EntitySyncService::new(
            gateway.clone(),
            cache.clone(),
            network.clone(),
            options.clone(),
        );
        let members = EntitySyncService::new(
            gateway.clone(),
            cache.clone(),
            network.clone(),
            options.clone(),
        );
        let setlists = EntitySyncService::new(gateway.clone(), cache, network.clone(), options);
        let groups = GroupDirectory::new(gateway, network.clone(), members.clone());

        Self {
            network,
            events,
            tasks,
            members,
            setlists,
            groups,
        }
    }

    pub fn new_shared(
        gateway: Arc<dyn RemoteGateway>,
        cache: Arc<dyn LocalCache>,
        network: Arc<NetworkMonitor>,
        options: SyncOptions,
    ) -> Arc<Self> {
        Arc::new(Self::new(gateway, cache, network, options))
    }

    /// Reset every service, e.g. on logout.
    pub fn clear_all(&self) {
        self.events.clear();
        self.tasks.clear();
        self.members.clear();
        self.setlists.clear();
        tracing::info!("Cleared all sync state");
    }
}
