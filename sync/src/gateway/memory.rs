//! In-process document store.
//!
//! Used when no database is configured and by the tests. Live queries are
//! fanned out after every write to a collection, under that collection's
//! entry lock, so watchers see snapshots in write order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bandsync_engine::{Document, Fields};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{FieldQuery, GatewayError, GatewayResult, QueryStream, RemoteGateway, SnapshotSender};

type CollectionDocs = BTreeMap<String, Fields>;

#[derive(Debug)]
struct Watcher {
    query: FieldQuery,
    sender: SnapshotSender,
}

/// A [`RemoteGateway`] backed by process memory.
#[derive(Debug)]
pub struct MemoryGateway {
    collections: DashMap<String, CollectionDocs>,
    watchers: Arc<DashMap<u64, Watcher>>,
    next_watcher: AtomicU64,
    available: AtomicBool,
    reject_writes: AtomicBool,
    requests: AtomicUsize,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            watchers: Arc::new(DashMap::new()),
            next_watcher: AtomicU64::new(1),
            available: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// When unavailable, every call fails with [`GatewayError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// When set, creates, updates and deletes fail with [`GatewayError::Rejected`].
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of gateway calls made so far, failed ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of live queries currently open.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Number of documents stored in `collection`.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |docs| docs.len())
    }

    fn begin(&self) -> GatewayResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Unavailable)
        }
    }

    fn begin_write(&self, collection: &str) -> GatewayResult<()> {
        self.begin()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected(format!(
                "writes to {} are not permitted",
                collection
            )));
        }
        Ok(())
    }

    /// Push the current result set to every watcher of `collection`.
    fn publish(&self, collection: &str, docs: &CollectionDocs) {
        let mut closed = Vec::new();

        for entry in self.watchers.iter() {
            let watcher = entry.value();
            if watcher.query.collection != collection {
                continue;
            }
            let snapshot = select(docs, &watcher.query);
            if watcher.sender.send(Ok(snapshot)).is_err() {
                closed.push(*entry.key());
            }
        }

        for id in closed {
            self.watchers.remove(&id);
        }
    }
}

fn select(docs: &CollectionDocs, query: &FieldQuery) -> Vec<Document> {
    docs.iter()
        .filter(|(_, fields)| fields.get(&query.field) == Some(&query.value))
        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
        .collect()
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> GatewayResult<Vec<Document>> {
        self.begin()?;
        let query = FieldQuery::new(collection, field, value.clone());
        Ok(self
            .collections
            .get(collection)
            .map(|docs| select(&docs, &query))
            .unwrap_or_default())
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> GatewayResult<Option<Document>> {
        self.begin()?;
        Ok(self.collections.get(collection).and_then(|docs| {
            docs.get(id)
                .map(|fields| Document::new(id.to_string(), fields.clone()))
        }))
    }

    async fn create(&self, collection: &str, fields: Fields) -> GatewayResult<String> {
        self.begin_write(collection)?;
        let id = uuid::Uuid::new_v4().to_string();

        let mut docs = self.collections.entry(collection.to_string()).or_default();
        docs.insert(id.clone(), fields);
        self.publish(collection, &docs);

        tracing::trace!(collection = %collection, id = %id, "Document created");
        Ok(id)
    }

    async fn update_by_id(&self, collection: &str, id: &str, fields: Fields) -> GatewayResult<()> {
        self.begin_write(collection)?;
        let not_found = || GatewayError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };

        let mut docs = self.collections.get_mut(collection).ok_or_else(not_found)?;
        let existing = docs.get_mut(id).ok_or_else(not_found)?;
        for (key, value) in fields {
            existing.insert(key, value);
        }
        self.publish(collection, &docs);
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> GatewayResult<()> {
        self.begin_write(collection)?;
        if let Some(mut docs) = self.collections.get_mut(collection) {
            if docs.remove(id).is_some() {
                self.publish(collection, &docs);
            }
        }
        Ok(())
    }

    async fn subscribe_query(&self, query: FieldQuery) -> GatewayResult<QueryStream> {
        self.begin()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let watcher_id = self.next_watcher.fetch_add(1, Ordering::SeqCst);

        // Register under the collection lock so no write slips between the
        // initial snapshot and the first published change.
        let docs = self.collections.entry(query.collection.clone()).or_default();
        let _ = sender.send(Ok(select(&docs, &query)));
        self.watchers.insert(watcher_id, Watcher { query, sender });
        drop(docs);

        tracing::debug!(watcher_id, "Live query registered");

        let watchers = Arc::clone(&self.watchers);
        Ok(QueryStream::new(receiver, move || {
            watchers.remove(&watcher_id);
            tracing::debug!(watcher_id, "Live query closed");
        }))
    }
}
