//! Entity sync service.
//!
//! One service per entity kind owns the authoritative in-memory list for one
//! group at a time. It multiplexes subscribers, applies confirmed writes to
//! the list right away and re-fetches the scope in the background, and falls
//! back to the local cache whenever the store cannot be reached.
//!
//! Every change to the list takes a ticket from a monotonic counter. A fetch
//! result carrying a ticket older than the last applied change never replaces
//! the list, so a slow response can never roll it back. It still answers its
//! own caller.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bandsync_engine::{
    CacheEntry, Dated, Document, Entity, GroupId, SortedRecords, Task, WriteMode,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::cache::LocalCache;
use crate::gateway::{FieldQuery, GatewayError, RemoteGateway};
use crate::network::NetworkMonitor;
use crate::subscription::{Snapshot, SubscriberRegistry, Subscription};

/// Default wait before a background reconciliation fetch.
pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(500);

/// Errors recorded by a sync service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("cannot {action} while offline")]
    OfflineBlocked { action: &'static str },

    #[error("failed to load {collection}: {message}")]
    RemoteRead { collection: String, message: String },

    #[error("failed to {action} {collection}: {message}")]
    RemoteWrite {
        action: &'static str,
        collection: String,
        message: String,
    },

    #[error("invalid record: {0}")]
    Validation(#[from] bandsync_engine::Error),

    #[error("record has no id")]
    MissingId,

    #[error("record {0} not found")]
    NotFound(String),

    #[error("no offline data available")]
    CacheMiss,

    #[error("loaded from cache (offline)")]
    LoadedFromCache,
}

impl SyncError {
    fn remote_read(collection: &str, error: GatewayError) -> Self {
        SyncError::RemoteRead {
            collection: collection.to_string(),
            message: error.to_string(),
        }
    }

    fn remote_write(action: &'static str, collection: &str, error: GatewayError) -> Self {
        SyncError::RemoteWrite {
            action,
            collection: collection.to_string(),
            message: error.to_string(),
        }
    }
}

/// Tunables for a sync service.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Wait before the background reconciliation fetch after a write.
    pub reconcile_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
        }
    }
}

/// Operational state for UI feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub busy: bool,
    pub last_error: Option<String>,
    pub offline: bool,
}

struct State<T: Entity> {
    records: SortedRecords<T>,
    /// Group the list currently belongs to
    group_id: Option<GroupId>,
    last_error: Option<SyncError>,
    /// Ticket of the last change applied to `records`
    applied_ticket: u64,
}

impl<T: Entity> State<T> {
    /// Whether a record of `group_id` belongs in the current list.
    fn in_scope(&self, group_id: &str) -> bool {
        self.group_id
            .as_deref()
            .map_or(true, |current| current == group_id)
    }

    /// Whether the list currently holds `group_id`'s records.
    fn holds(&self, group_id: &str) -> bool {
        self.group_id.as_deref() == Some(group_id)
    }
}

/// Where a remote result comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// An explicit load; may switch the list to another group
    Load,
    /// Reconciliation or a live query; only refreshes the group on screen
    Refresh,
}

/// Counts in-flight operations; `busy` while any is running.
struct BusyGuard<'a>(&'a AtomicUsize);

impl<'a> BusyGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sync service for one entity kind.
pub struct EntitySyncService<T: Entity> {
    me: Weak<Self>,
    gateway: Arc<dyn RemoteGateway>,
    cache: Arc<dyn LocalCache>,
    network: Arc<NetworkMonitor>,
    options: SyncOptions,
    state: Mutex<State<T>>,
    subscribers: Arc<SubscriberRegistry<T>>,
    tickets: AtomicU64,
    busy: AtomicUsize,
    /// Pending reconciliation per scope key
    reconciliations: DashMap<String, JoinHandle<()>>,
    live_query: Mutex<Option<(GroupId, JoinHandle<()>)>>,
}

impl<T: Entity> std::fmt::Debug for EntitySyncService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySyncService")
            .field("collection", &T::schema().collection)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl<T: Entity> EntitySyncService<T> {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        cache: Arc<dyn LocalCache>,
        network: Arc<NetworkMonitor>,
        options: SyncOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            gateway,
            cache,
            network,
            options,
            state: Mutex::new(State {
                records: SortedRecords::new(),
                group_id: None,
                last_error: None,
                applied_ticket: 0,
            }),
            subscribers: Arc::new(SubscriberRegistry::new()),
            tickets: AtomicU64::new(1),
            busy: AtomicUsize::new(0),
            reconciliations: DashMap::new(),
            live_query: Mutex::new(None),
        })
    }

    fn collection() -> &'static str {
        &T::schema().collection
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst)
    }

    fn notify(&self, state: &State<T>) {
        let snapshot: Snapshot<T> = state.records.as_slice().into();
        self.subscribers.broadcast(&snapshot);
    }

    // ------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------

    /// Subscribe to list changes. The current list is queued immediately.
    ///
    /// Subscribing does not fetch anything.
    pub fn subscribe(&self) -> Subscription<T> {
        let state = self.state();
        Subscription::open(&self.subscribers, state.records.as_slice().into())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Load `group_id`'s records.
    ///
    /// Never fails: degrades from the remote store to the local cache to an
    /// empty list, recording why in the last error.
    pub async fn fetch(&self, group_id: &str) -> Vec<T> {
        let _busy = BusyGuard::enter(&self.busy);
        let ticket = self.next_ticket();
        self.state().last_error = None;

        if self.network.is_offline() {
            tracing::debug!(collection = Self::collection(), group_id = %group_id, "Offline, loading from cache");
            return self.load_from_cache(group_id, ticket);
        }

        match self.query(group_id).await {
            Ok(records) => self.apply_fetched(group_id, records, ticket, Origin::Load),
            Err(error) => {
                tracing::warn!(collection = Self::collection(), group_id = %group_id, "Fetch failed: {}", error);
                self.state().last_error = Some(error);
                self.load_from_cache(group_id, ticket)
            }
        }
    }

    async fn query(&self, group_id: &str) -> Result<Vec<T>, SyncError> {
        let schema = T::schema();
        let documents = self
            .gateway
            .query_by_field(
                &schema.collection,
                &schema.scope_field,
                &Value::String(group_id.to_string()),
            )
            .await
            .map_err(|e| SyncError::remote_read(&schema.collection, e))?;
        Ok(decode_documents(documents))
    }

    /// Replace the list with a remote result and cache it.
    fn apply_fetched(&self, group_id: &str, records: Vec<T>, ticket: u64, origin: Origin) -> Vec<T> {
        let mut state = self.state();
        if origin == Origin::Refresh && !state.in_scope(group_id) {
            tracing::debug!(
                collection = Self::collection(),
                group_id = %group_id,
                "Refresh for a group no longer shown, caching only"
            );
            return self.apply_elsewhere(&state, group_id, records);
        }
        if ticket < state.applied_ticket {
            tracing::debug!(
                collection = Self::collection(),
                group_id = %group_id,
                ticket,
                applied = state.applied_ticket,
                "Stale fetch result, list left as is"
            );
            return self.apply_elsewhere(&state, group_id, records);
        }

        let records = SortedRecords::from_unsorted(records);
        state.applied_ticket = ticket;
        state.group_id = Some(group_id.to_string());
        self.write_cache(group_id, records.as_slice());

        if state.records != records {
            state.records = records;
            self.notify(&state);
        }

        tracing::debug!(
            collection = Self::collection(),
            group_id = %group_id,
            count = state.records.len(),
            "Applied remote records"
        );
        state.records.to_vec()
    }

    /// A remote result that may not replace the list.
    ///
    /// When the list already holds `group_id`, a newer change has been
    /// applied to it and the list wins. Otherwise the result still answers
    /// its caller and refreshes that scope's cache entry.
    fn apply_elsewhere(&self, state: &State<T>, group_id: &str, records: Vec<T>) -> Vec<T> {
        if state.holds(group_id) {
            return state.records.to_vec();
        }
        let records = SortedRecords::from_unsorted(records);
        self.write_cache(group_id, records.as_slice());
        records.to_vec()
    }

    /// Best effort: failures are logged, never surfaced.
    fn write_cache(&self, group_id: &str, records: &[T]) {
        let entry = CacheEntry::new(group_id, records.to_vec(), Utc::now());
        let result = entry
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.cache
                    .set(&entry.scope_key, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            tracing::warn!(scope = %entry.scope_key, "Failed to write cache: {}", e);
        }
    }

    fn read_cache(&self, group_id: &str) -> Option<CacheEntry<T>> {
        let key = T::schema().scope_key(group_id);
        match self.cache.get(&key) {
            Ok(Some(json)) => match CacheEntry::from_json(&json, &key) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(scope = %key, "Ignoring unreadable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(scope = %key, "Failed to read cache: {}", e);
                None
            }
        }
    }

    /// The fallback path: replace the list with the cached copy, if any.
    fn load_from_cache(&self, group_id: &str, ticket: u64) -> Vec<T> {
        let entry = self.read_cache(group_id);

        let mut state = self.state();
        if ticket < state.applied_ticket {
            if state.holds(group_id) {
                return state.records.to_vec();
            }
            return entry
                .map(|entry| SortedRecords::from_unsorted(entry.records).to_vec())
                .unwrap_or_default();
        }

        let Some(entry) = entry else {
            tracing::info!(collection = Self::collection(), group_id = %group_id, "No cached data");
            state.last_error = Some(SyncError::CacheMiss);
            return Vec::new();
        };

        let records = SortedRecords::from_unsorted(entry.records);
        state.applied_ticket = ticket;
        state.group_id = Some(group_id.to_string());
        if self.network.is_offline() {
            state.last_error = Some(SyncError::LoadedFromCache);
        }
        if state.records != records {
            state.records = records;
            self.notify(&state);
        }

        tracing::debug!(
            collection = Self::collection(),
            group_id = %group_id,
            count = state.records.len(),
            saved_at = %entry.saved_at,
            "Loaded records from cache"
        );
        state.records.to_vec()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn ensure_online(&self, action: &'static str) -> Result<(), SyncError> {
        if self.network.is_offline() {
            return Err(SyncError::OfflineBlocked { action });
        }
        Ok(())
    }

    /// Record a failed write for `status()`.
    fn finish_write<R>(&self, result: Result<R, SyncError>) -> Result<R, SyncError> {
        if let Err(error) = &result {
            tracing::warn!(collection = Self::collection(), "Write failed: {}", error);
            self.state().last_error = Some(error.clone());
        }
        result
    }

    /// Store a new record. On success the stored copy, with its ID, is in
    /// the list and subscribers have been notified.
    pub async fn create(&self, record: T) -> Result<T, SyncError> {
        let _busy = BusyGuard::enter(&self.busy);
        let result = self.try_create(record).await;
        self.finish_write(result)
    }

    async fn try_create(&self, mut record: T) -> Result<T, SyncError> {
        self.ensure_online("create")?;
        // Nullable scopes (a member leaving a group) may only be cleared by updates
        if record.group_id().trim().is_empty() {
            let scope = T::schema().scope_field.clone();
            return Err(bandsync_engine::Error::MissingRequiredField(scope).into());
        }
        let fields = record.to_fields(WriteMode::Create)?;

        let collection = Self::collection();
        let id = self
            .gateway
            .create(collection, fields)
            .await
            .map_err(|e| SyncError::remote_write("create", collection, e))?;
        record.set_id(id);

        let ticket = self.next_ticket();
        let applied = {
            let mut state = self.state();
            let group_id = record.group_id();
            if state.in_scope(group_id) {
                state.applied_ticket = ticket;
                state.group_id = Some(group_id.to_string());
                state.records.insert(record.clone());
                self.notify(&state);
                true
            } else {
                false
            }
        };

        tracing::info!(collection = collection, id = ?record.id(), "Record created");
        if applied {
            self.reconcile_later(record.group_id());
        }
        Ok(record)
    }

    /// Overwrite a stored record with `record`.
    pub async fn update(&self, record: T) -> Result<T, SyncError> {
        let _busy = BusyGuard::enter(&self.busy);
        let result = self.try_update(record).await;
        self.finish_write(result)
    }

    async fn try_update(&self, record: T) -> Result<T, SyncError> {
        let id = record.id().ok_or(SyncError::MissingId)?.to_string();
        self.ensure_online("update")?;
        let fields = record.to_fields(WriteMode::Update)?;

        let collection = Self::collection();
        self.gateway
            .update_by_id(collection, &id, fields)
            .await
            .map_err(|e| SyncError::remote_write("update", collection, e))?;

        self.apply_replace(record.clone());
        tracing::info!(collection = collection, id = %id, "Record updated");
        Ok(record)
    }

    /// Swap a confirmed record into the list and schedule reconciliation.
    fn apply_replace(&self, record: T) {
        let ticket = self.next_ticket();
        let reconcile = {
            let mut state = self.state();
            let changed = if state.in_scope(record.group_id()) {
                state.records.replace(record)
            } else {
                // Moved out of the group on screen
                record.id().is_some_and(|id| state.records.remove(id).is_some())
            };
            if changed {
                state.applied_ticket = ticket;
                self.notify(&state);
            }
            changed.then(|| state.group_id.clone()).flatten()
        };
        if let Some(group_id) = reconcile {
            self.reconcile_later(&group_id);
        }
    }

    /// Delete a stored record.
    pub async fn delete(&self, record: &T) -> Result<(), SyncError> {
        match record.id() {
            Some(id) => self.delete_id(id).await,
            None => self.finish_write(Err(SyncError::MissingId)),
        }
    }

    /// Delete a stored record by ID.
    pub async fn delete_id(&self, id: &str) -> Result<(), SyncError> {
        let _busy = BusyGuard::enter(&self.busy);
        let result = self.try_delete(id).await;
        self.finish_write(result)
    }

    async fn try_delete(&self, id: &str) -> Result<(), SyncError> {
        self.ensure_online("delete")?;

        let collection = Self::collection();
        self.gateway
            .delete_by_id(collection, id)
            .await
            .map_err(|e| SyncError::remote_write("delete", collection, e))?;

        // Removal is exact, so no reconciliation
        let ticket = self.next_ticket();
        let mut state = self.state();
        if state.records.remove(id).is_some() {
            state.applied_ticket = ticket;
            self.notify(&state);
        }

        tracing::info!(collection = collection, id = %id, "Record deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Schedule a background re-fetch of `group_id`.
    ///
    /// Replaces any reconciliation already pending for the scope. Does
    /// nothing if the list currently shows another group.
    pub fn reconcile_later(&self, group_id: &str) {
        if self.state().group_id.as_deref() != Some(group_id) {
            return;
        }
        let Some(service) = self.me.upgrade() else {
            return;
        };

        let key = T::schema().scope_key(group_id);
        let group_id = group_id.to_string();
        let delay = self.options.reconcile_delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.reconcile(&group_id).await;
        });

        if let Some(previous) = self.reconciliations.insert(key, handle) {
            previous.abort();
        }
    }

    /// Re-fetch a scope now. Errors are logged only and never fall back to
    /// the cache.
    pub async fn reconcile(&self, group_id: &str) {
        if self.network.is_offline() {
            tracing::debug!(collection = Self::collection(), group_id = %group_id, "Offline, skipping reconciliation");
            return;
        }

        let ticket = self.next_ticket();
        match self.query(group_id).await {
            Ok(records) => {
                self.apply_fetched(group_id, records, ticket, Origin::Refresh);
            }
            Err(e) => {
                tracing::warn!(collection = Self::collection(), group_id = %group_id, "Reconciliation failed: {}", e);
            }
        }
    }

    /// Number of reconciliations scheduled and not yet finished.
    pub fn pending_reconciliations(&self) -> usize {
        self.reconciliations
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    // ------------------------------------------------------------------
    // Live queries
    // ------------------------------------------------------------------

    /// Follow `group_id` remotely: every remote change replaces the list,
    /// rewrites the cache and notifies subscribers.
    ///
    /// At most one live query runs per service; watching another group stops
    /// the previous one.
    pub async fn watch_group(&self, group_id: &str) -> Result<(), SyncError> {
        self.ensure_online("watch")?;

        let schema = T::schema();
        let query = FieldQuery::new(
            schema.collection.as_str(),
            schema.scope_field.as_str(),
            group_id,
        );
        let mut stream = self
            .gateway
            .subscribe_query(query)
            .await
            .map_err(|e| SyncError::remote_read(&schema.collection, e))?;

        let service = self.me.clone();
        let group = group_id.to_string();
        let handle = tokio::spawn(async move {
            // The first snapshot loads the group, later ones refresh it
            let mut origin = Origin::Load;
            while let Some(result) = stream.next().await {
                let Some(service) = service.upgrade() else {
                    break;
                };
                match result {
                    Ok(documents) => {
                        let ticket = service.next_ticket();
                        service.apply_fetched(&group, decode_documents(documents), ticket, origin);
                        origin = Origin::Refresh;
                    }
                    Err(e) => {
                        tracing::warn!(collection = Self::collection(), group_id = %group, "Live query error: {}", e);
                    }
                }
            }
            tracing::debug!(collection = Self::collection(), group_id = %group, "Live query ended");
        });

        let previous = self
            .live_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((group_id.to_string(), handle));
        if let Some((_, previous)) = previous {
            previous.abort();
        }

        tracing::info!(collection = schema.collection.as_str(), group_id = %group_id, "Watching group");
        Ok(())
    }

    /// Stop the live query, if any.
    pub fn unwatch(&self) {
        let current = self
            .live_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((group_id, handle)) = current {
            handle.abort();
            tracing::debug!(collection = Self::collection(), group_id = %group_id, "Stopped watching group");
        }
    }

    /// Group followed by the live query, if any.
    pub fn watched_group(&self) -> Option<GroupId> {
        self.live_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(group_id, _)| group_id.clone())
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Empty the list, clear the last error and notify subscribers. Pending
    /// reconciliations and the live query are stopped.
    pub fn clear(&self) {
        self.reconciliations.retain(|_, handle| {
            handle.abort();
            false
        });
        self.unwatch();

        let ticket = self.next_ticket();
        let mut state = self.state();
        state.applied_ticket = ticket;
        state.group_id = None;
        state.last_error = None;
        state.records.clear();
        self.notify(&state);
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            busy: self.busy.load(Ordering::SeqCst) > 0,
            last_error: self.state().last_error.as_ref().map(ToString::to_string),
            offline: self.network.is_offline(),
        }
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.state().last_error.clone()
    }

    /// Group the list currently belongs to.
    pub fn group_id(&self) -> Option<GroupId> {
        self.state().group_id.clone()
    }

    // ------------------------------------------------------------------
    // Derived queries (no store contact)
    // ------------------------------------------------------------------

    pub fn records(&self) -> Vec<T> {
        self.state().records.to_vec()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.state().records.get(id).cloned()
    }

    pub fn by_category(&self, category: &str) -> Vec<T> {
        self.state().records.by_category(category)
    }
}

impl<T: Dated> EntitySyncService<T> {
    pub fn on_day<Tz: TimeZone>(&self, day: NaiveDate, tz: &Tz) -> Vec<T> {
        self.state().records.on_day(day, tz)
    }

    pub fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<T> {
        self.state().records.upcoming(now, limit)
    }

    pub fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<T> {
        self.state().records.in_range(start, end)
    }

    pub fn in_month<Tz: TimeZone>(&self, year: i32, month: u32, tz: &Tz) -> Vec<T> {
        self.state().records.in_month(year, month, tz)
    }
}

impl EntitySyncService<Task> {
    /// Flip `completed` on a stored task. Only that field is written.
    pub async fn toggle_completion(&self, task: &Task) -> Result<Task, SyncError> {
        let _busy = BusyGuard::enter(&self.busy);
        let result = self.try_toggle(task).await;
        self.finish_write(result)
    }

    /// Flip `completed` on the listed task with ID `id`.
    pub async fn toggle_completion_id(&self, id: &str) -> Result<Task, SyncError> {
        match self.get(id) {
            Some(task) => self.toggle_completion(&task).await,
            None => self.finish_write(Err(SyncError::NotFound(id.to_string()))),
        }
    }

    async fn try_toggle(&self, task: &Task) -> Result<Task, SyncError> {
        let id = task.id.clone().ok_or(SyncError::MissingId)?;
        self.ensure_online("update")?;

        let completed = !task.completed;
        let fields = Task::schema().encode_field("completed", &Value::Bool(completed))?;

        let collection = Self::collection();
        self.gateway
            .update_by_id(collection, &id, fields)
            .await
            .map_err(|e| SyncError::remote_write("update", collection, e))?;

        let mut toggled = task.clone();
        toggled.completed = completed;
        self.apply_replace(toggled.clone());
        tracing::info!(collection = collection, id = %id, completed, "Task completion toggled");
        Ok(toggled)
    }
}

impl<T: Entity> Drop for EntitySyncService<T> {
    fn drop(&mut self) {
        if let Some((_, handle)) = self
            .live_query
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Decode store documents, skipping any that do not fit the schema.
fn decode_documents<T: Entity>(documents: Vec<Document>) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match T::from_document(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(collection = %T::schema().collection, id = %doc.id, "Skipping undecodable document: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::gateway::MemoryGateway;
    use bandsync_engine::{Event, EventType, Member};
    use chrono::TimeZone;

    struct Harness {
        gateway: Arc<MemoryGateway>,
        cache: Arc<MemoryCache>,
        network: Arc<NetworkMonitor>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                gateway: MemoryGateway::new_shared(),
                cache: Arc::new(MemoryCache::new()),
                network: NetworkMonitor::new_shared(true),
            }
        }

        fn service<T: Entity>(&self, reconcile_delay: Duration) -> Arc<EntitySyncService<T>> {
            EntitySyncService::new(
                self.gateway.clone(),
                self.cache.clone(),
                self.network.clone(),
                SyncOptions { reconcile_delay },
            )
        }

        fn tasks(&self) -> Arc<EntitySyncService<Task>> {
            self.service(Duration::from_secs(3600))
        }
    }

    fn due(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_inserts_sorted_and_notifies() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let mut sub = tasks.subscribe();
        assert!(sub.try_recv().unwrap().is_empty());

        tasks.create(Task::new("Later", due(5), "G1")).await.unwrap();
        let first = tasks.create(Task::new("Sooner", due(2), "G1")).await.unwrap();
        assert!(first.id.is_some());

        let titles: Vec<_> = tasks.records().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Sooner", "Later"]);

        assert_eq!(sub.try_recv().unwrap().len(), 1);
        assert_eq!(sub.try_recv().unwrap().len(), 2);
        assert!(sub.try_recv().is_none());
        assert_eq!(tasks.group_id().as_deref(), Some("G1"));
    }

    #[tokio::test]
    async fn create_for_other_group_leaves_list_alone() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        tasks.create(Task::new("Mine", due(1), "G1")).await.unwrap();
        tasks.create(Task::new("Theirs", due(1), "G2")).await.unwrap();

        assert_eq!(tasks.records().len(), 1);
        assert_eq!(harness.gateway.document_count("tasks"), 2);
    }

    #[tokio::test]
    async fn validation_failure_is_recorded() {
        let harness = Harness::new();
        let tasks = harness.tasks();

        let result = tasks.create(Task::new("", due(2), "G1")).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(harness.gateway.request_count(), 0);

        let status = tasks.status();
        assert!(!status.busy);
        assert!(status.last_error.unwrap().contains("title"));
    }

    #[tokio::test]
    async fn offline_writes_are_blocked() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        harness.network.set_online(false);

        let result = tasks.create(Task::new("x", due(1), "G1")).await;
        assert_eq!(result, Err(SyncError::OfflineBlocked { action: "create" }));
        assert_eq!(
            tasks.status().last_error.as_deref(),
            Some("cannot create while offline")
        );
        assert!(tasks.status().offline);
        assert_eq!(harness.gateway.request_count(), 0);
    }

    #[tokio::test]
    async fn update_requires_id_first() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        harness.network.set_online(false);

        let result = tasks.update(Task::new("x", due(1), "G1")).await;
        assert_eq!(result, Err(SyncError::MissingId));
    }

    #[tokio::test]
    async fn update_moves_record() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let mut a = tasks.create(Task::new("a", due(1), "G1")).await.unwrap();
        tasks.create(Task::new("b", due(2), "G1")).await.unwrap();

        a.due_date = due(3);
        a.description = "moved".into();
        tasks.update(a.clone()).await.unwrap();

        let titles: Vec<_> = tasks.records().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["b", "a"]);

        let fetched = tasks.fetch("G1").await;
        assert_eq!(fetched.last(), Some(&a));
    }

    #[tokio::test]
    async fn update_clears_nullable_fields_remotely() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let mut task = Task::new("a", due(1), "G1");
        task.assigned_to = "Ann".into();
        let mut task = tasks.create(task).await.unwrap();

        task.assigned_to.clear();
        tasks.update(task.clone()).await.unwrap();

        let id = task.id.clone().unwrap();
        let doc = harness.gateway.get_by_id("tasks", &id).await.unwrap().unwrap();
        assert_eq!(doc.get("assignedTo"), Some(&Value::Null));
        assert_eq!(tasks.fetch("G1").await, vec![task]);
    }

    #[tokio::test]
    async fn delete_removes_and_notifies_once() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let task = tasks.create(Task::new("a", due(1), "G1")).await.unwrap();

        let mut sub = tasks.subscribe();
        assert_eq!(sub.try_recv().unwrap().len(), 1);

        tasks.delete(&task).await.unwrap();
        assert!(sub.try_recv().unwrap().is_empty());
        assert!(sub.try_recv().is_none());
        assert!(tasks.records().is_empty());
    }

    #[tokio::test]
    async fn delete_without_id_fails() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let result = tasks.delete(&Task::new("a", due(1), "G1")).await;
        assert_eq!(result, Err(SyncError::MissingId));
        assert_eq!(tasks.last_error(), Some(SyncError::MissingId));
    }

    #[tokio::test]
    async fn fetch_writes_cache_and_offline_reads_it() {
        let harness = Harness::new();
        let writer = harness.tasks();
        writer.create(Task::new("a", due(1), "G1")).await.unwrap();

        let reader = harness.tasks();
        let fetched = reader.fetch("G1").await;
        assert_eq!(fetched.len(), 1);
        assert!(harness.cache.get("tasks_G1").unwrap().is_some());

        harness.network.set_online(false);
        let requests = harness.gateway.request_count();
        let offline = reader.fetch("G1").await;

        assert_eq!(offline, fetched);
        assert_eq!(harness.gateway.request_count(), requests);
        assert_eq!(reader.last_error(), Some(SyncError::LoadedFromCache));
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_cache() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();
        tasks.fetch("G1").await;

        harness.gateway.set_available(false);
        let records = tasks.fetch("G1").await;
        assert_eq!(records.len(), 1);
        assert!(matches!(
            tasks.last_error(),
            Some(SyncError::RemoteRead { .. })
        ));
    }

    #[tokio::test]
    async fn cache_miss_returns_empty() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        harness.network.set_online(false);

        assert!(tasks.fetch("G9").await.is_empty());
        assert_eq!(tasks.last_error(), Some(SyncError::CacheMiss));
        assert_eq!(
            tasks.status().last_error.as_deref(),
            Some("no offline data available")
        );
    }

    #[tokio::test]
    async fn fetch_clears_previous_error() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let _ = tasks.create(Task::new("", due(1), "G1")).await;
        assert!(tasks.last_error().is_some());

        tasks.fetch("G1").await;
        assert_eq!(tasks.last_error(), None);
    }

    #[tokio::test]
    async fn stale_fetch_is_discarded() {
        let harness = Harness::new();
        let tasks = harness.tasks();

        // A fetch that started before a confirmed write must not undo it
        let stale_ticket = tasks.next_ticket();
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();

        let result = tasks.apply_fetched("G1", Vec::new(), stale_ticket, Origin::Load);
        assert_eq!(result.len(), 1);
        assert_eq!(tasks.records().len(), 1);
        assert!(harness.cache.get("tasks_G1").unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_for_other_group_is_ignored() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        tasks.fetch("G2").await;

        let ticket = tasks.next_ticket();
        tasks.apply_fetched("G1", vec![Task::new("a", due(1), "G1")], ticket, Origin::Refresh);
        assert!(tasks.records().is_empty());
        assert_eq!(tasks.group_id().as_deref(), Some("G2"));

        let ticket = tasks.next_ticket();
        tasks.apply_fetched("G1", vec![Task::new("a", due(1), "G1")], ticket, Origin::Load);
        assert_eq!(tasks.records().len(), 1);
        assert_eq!(tasks.group_id().as_deref(), Some("G1"));
    }

    #[tokio::test]
    async fn stale_fetch_for_other_group_answers_its_caller() {
        let harness = Harness::new();
        let tasks = harness.tasks();

        let slow_ticket = tasks.next_ticket();
        let ticket = tasks.next_ticket();
        tasks.apply_fetched("G2", vec![Task::new("b", due(2), "G2")], ticket, Origin::Load);

        let mut sub = tasks.subscribe();
        sub.try_recv();
        let result = tasks.apply_fetched(
            "G1",
            vec![Task::new("a", due(1), "G1"), Task::new("c", due(3), "G1")],
            slow_ticket,
            Origin::Load,
        );

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|t| t.group_id == "G1"));
        assert_eq!(tasks.group_id().as_deref(), Some("G2"));
        assert_eq!(tasks.records()[0].title, "b");
        assert!(sub.try_recv().is_none());

        let cached = harness.cache.get("tasks_G1").unwrap().unwrap();
        let entry = CacheEntry::<Task>::from_json(&cached, "tasks_G1").unwrap();
        assert_eq!(entry.records.len(), 2);
    }

    #[tokio::test]
    async fn stale_cache_fallback_for_other_group_answers_its_caller() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let entry = CacheEntry::new("G1", vec![Task::new("a", due(1), "G1")], Utc::now());
        harness.cache.set("tasks_G1", &entry.to_json().unwrap()).unwrap();

        let slow_ticket = tasks.next_ticket();
        let ticket = tasks.next_ticket();
        tasks.apply_fetched("G2", Vec::new(), ticket, Origin::Load);

        let result = tasks.load_from_cache("G1", slow_ticket);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].group_id, "G1");
        assert_eq!(tasks.group_id().as_deref(), Some("G2"));
        assert!(tasks.last_error().is_none());
    }

    #[tokio::test]
    async fn reconciliation_replaces_list() {
        let harness = Harness::new();
        let tasks: Arc<EntitySyncService<Task>> = harness.service(Duration::from_millis(10));
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();

        // Someone else writes directly to the store
        let other = Task::new("b", due(2), "G1");
        harness
            .gateway
            .create("tasks", other.to_fields(WriteMode::Create).unwrap())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tasks.records().len(), 2);
        assert_eq!(tasks.pending_reconciliations(), 0);
    }

    #[tokio::test]
    async fn newer_reconciliation_supersedes_older() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();
        tasks.create(Task::new("b", due(2), "G1")).await.unwrap();

        assert_eq!(tasks.reconciliations.len(), 1);
        assert_eq!(tasks.pending_reconciliations(), 1);

        tasks.clear();
        assert_eq!(tasks.pending_reconciliations(), 0);
    }

    #[tokio::test]
    async fn reconciliation_errors_are_not_recorded() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();

        harness.gateway.set_available(false);
        tasks.reconcile("G1").await;
        assert_eq!(tasks.last_error(), None);
        assert_eq!(tasks.records().len(), 1);
    }

    #[tokio::test]
    async fn toggle_twice_restores() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let task = tasks.create(Task::new("a", due(1), "G1")).await.unwrap();

        let once = tasks.toggle_completion(&task).await.unwrap();
        assert!(once.completed);
        let twice = tasks.toggle_completion(&once).await.unwrap();
        assert!(!twice.completed);

        let id = task.id.clone().unwrap();
        assert_eq!(tasks.get(&id).map(|t| t.completed), Some(false));
        let doc = harness.gateway.get_by_id("tasks", &id).await.unwrap().unwrap();
        assert_eq!(doc.get("completed"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn toggle_unknown_id_is_not_found() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        let result = tasks.toggle_completion_id("missing").await;
        assert_eq!(result, Err(SyncError::NotFound("missing".into())));
    }

    #[tokio::test]
    async fn clear_empties_and_notifies() {
        let harness = Harness::new();
        let tasks = harness.tasks();
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();
        let _ = tasks.create(Task::new("", due(1), "G1")).await;

        let mut sub = tasks.subscribe();
        let _ = sub.try_recv();

        tasks.clear();
        assert!(sub.try_recv().unwrap().is_empty());
        assert!(tasks.records().is_empty());
        assert_eq!(tasks.last_error(), None);
        assert_eq!(tasks.group_id(), None);
    }

    #[tokio::test]
    async fn live_query_follows_remote_changes() {
        let harness = Harness::new();
        let events: Arc<EntitySyncService<Event>> = harness.service(Duration::from_secs(3600));
        let mut sub = events.subscribe();
        let _ = sub.try_recv();

        events.watch_group("G1").await.unwrap();
        assert_eq!(events.watched_group().as_deref(), Some("G1"));

        let gig = Event::new("Gig", due(10), EventType::Concert, "G1");
        harness
            .gateway
            .create("events", gig.to_fields(WriteMode::Create).unwrap())
            .await
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(harness.cache.get("events_G1").unwrap().is_some());

        events.unwatch();
        assert_eq!(events.watched_group(), None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(harness.gateway.watcher_count(), 0);
    }

    #[tokio::test]
    async fn derived_queries() {
        let harness = Harness::new();
        let members: Arc<EntitySyncService<Member>> = harness.service(Duration::from_secs(3600));
        members.create(Member::new("Zed", "z@x", "G1")).await.unwrap();
        members.create(Member::new("amy", "a@x", "G1")).await.unwrap();
        assert_eq!(members.records()[0].name, "amy");
        assert_eq!(members.by_category("Member").len(), 2);

        let tasks = harness.tasks();
        tasks.create(Task::new("a", due(1), "G1")).await.unwrap();
        tasks.create(Task::new("b", due(20), "G1")).await.unwrap();
        assert_eq!(tasks.upcoming(due(1), 5).len(), 1);
        assert_eq!(tasks.in_range(due(1), due(20)).len(), 2);
        assert_eq!(tasks.in_month(2024, 6, &Utc).len(), 2);
        let day = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        assert_eq!(tasks.on_day(day, &Utc).len(), 1);
    }

    #[tokio::test]
    async fn create_without_group_is_rejected() {
        let harness = Harness::new();
        let members: Arc<EntitySyncService<Member>> = harness.service(Duration::from_secs(3600));

        let error = members.create(Member::new("x", "", "")).await.unwrap_err();
        assert_eq!(
            error,
            SyncError::Validation(bandsync_engine::Error::MissingRequiredField("groupId".into()))
        );
        assert!(members.records().is_empty());
        assert!(members.group_id().is_none());
        assert_eq!(harness.gateway.request_count(), 0);

        // Leaving a group is still an update that clears the scope
        let mut member = members.create(Member::new("x", "", "G1")).await.unwrap();
        member.group_id = String::new();
        members.update(member).await.unwrap();
        assert!(members.records().is_empty());
    }
}
