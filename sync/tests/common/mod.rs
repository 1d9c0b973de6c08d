//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bandsync_engine::{Document, Event, EventType, Fields, Task};
use bandsync_sync::gateway::GatewayResult;
use bandsync_sync::{
    FieldQuery, MemoryCache, MemoryGateway, NetworkMonitor, QueryStream, RemoteGateway,
    SyncContext, SyncOptions,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Wraps a [`MemoryGateway`] and holds back query results.
///
/// Each `query_by_field` call takes the next scripted delay; once the script
/// runs out, queries answer immediately. The store is read before the delay,
/// so a delayed result can be older than later writes.
pub struct DelayingGateway {
    inner: Arc<MemoryGateway>,
    delays: Mutex<VecDeque<Duration>>,
}

impl DelayingGateway {
    pub fn new(inner: Arc<MemoryGateway>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delays: Mutex::new(VecDeque::new()),
        })
    }

    pub fn delay_next_query(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    fn next_delay(&self) -> Duration {
        self.delays.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl RemoteGateway for DelayingGateway {
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> GatewayResult<Vec<Document>> {
        let delay = self.next_delay();
        let result = self.inner.query_by_field(collection, field, value).await;
        tokio::time::sleep(delay).await;
        result
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> GatewayResult<Option<Document>> {
        self.inner.get_by_id(collection, id).await
    }

    async fn create(&self, collection: &str, fields: Fields) -> GatewayResult<String> {
        self.inner.create(collection, fields).await
    }

    async fn update_by_id(&self, collection: &str, id: &str, fields: Fields) -> GatewayResult<()> {
        self.inner.update_by_id(collection, id, fields).await
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> GatewayResult<()> {
        self.inner.delete_by_id(collection, id).await
    }

    async fn subscribe_query(&self, query: FieldQuery) -> GatewayResult<QueryStream> {
        self.inner.subscribe_query(query).await
    }
}

/// A context over a fresh in-memory store and cache.
pub struct TestContext {
    pub gateway: Arc<MemoryGateway>,
    pub cache: Arc<MemoryCache>,
    pub network: Arc<NetworkMonitor>,
    pub context: Arc<SyncContext>,
}

pub fn fast_options() -> SyncOptions {
    SyncOptions {
        reconcile_delay: Duration::from_millis(20),
    }
}

pub fn test_context() -> TestContext {
    let gateway = MemoryGateway::new_shared();
    let cache = Arc::new(MemoryCache::new());
    let network = NetworkMonitor::new_shared(true);
    let context = SyncContext::new_shared(
        gateway.clone(),
        cache.clone(),
        network.clone(),
        fast_options(),
    );
    TestContext {
        gateway,
        cache,
        network,
        context,
    }
}

/// Wait long enough for scheduled reconciliations to finish.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

pub fn rehearsal(group_id: &str) -> Event {
    let mut event = Event::new("Rehearsal", at(5, 18), EventType::Rehearsal, group_id);
    event.location = Some("Studio B".into());
    event
}

pub fn task(title: &str, day: u32, group_id: &str) -> Task {
    Task::new(title, at(day, 12), group_id)
}
