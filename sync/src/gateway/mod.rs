//! Remote document store gateway.
//!
//! The services only ever talk to the store through [`RemoteGateway`]: equality
//! queries on one field, single-document reads and writes, and live queries
//! that push the full result set on every change.

mod memory;
mod postgres;

pub use memory::MemoryGateway;
pub use postgres::PgGateway;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bandsync_engine::{Document, Fields};
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

/// Errors reported by a gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("remote store unavailable")]
    Unavailable,

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored document: {0}")]
    Decode(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Equality filter over one collection: `field == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldQuery {
    pub collection: String,
    pub field: String,
    pub value: Value,
}

impl FieldQuery {
    pub fn new(
        collection: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.matches(&self.field, &self.value)
    }
}

/// Sender half handed to live query producers.
pub type SnapshotSender = mpsc::UnboundedSender<GatewayResult<Vec<Document>>>;

/// Result snapshots of a live query.
///
/// The first item is the result set at subscription time. Dropping the
/// stream ends the subscription.
pub struct QueryStream {
    receiver: mpsc::UnboundedReceiver<GatewayResult<Vec<Document>>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl QueryStream {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<GatewayResult<Vec<Document>>>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }
}

impl Stream for QueryStream {
    type Item = GatewayResult<Vec<Document>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.on_drop.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream").finish_non_exhaustive()
    }
}

/// The remote document store as seen by the sync services.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// All documents in `collection` whose `field` equals `value`.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> GatewayResult<Vec<Document>>;

    async fn get_by_id(&self, collection: &str, id: &str) -> GatewayResult<Option<Document>>;

    /// Store a new document and return its store-issued ID.
    async fn create(&self, collection: &str, fields: Fields) -> GatewayResult<String>;

    /// Merge `fields` into an existing document.
    ///
    /// Fails with [`GatewayError::NotFound`] if the document does not exist.
    async fn update_by_id(&self, collection: &str, id: &str, fields: Fields) -> GatewayResult<()>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_by_id(&self, collection: &str, id: &str) -> GatewayResult<()>;

    /// Start a live query.
    async fn subscribe_query(&self, query: FieldQuery) -> GatewayResult<QueryStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn field_query_matches() {
        let query = FieldQuery::new("tasks", "groupId", "G1");
        let doc = Document::new("t1", json!({"groupId": "G1"}).as_object().cloned().unwrap());
        assert!(query.matches(&doc));
        assert!(!FieldQuery::new("tasks", "groupId", "G2").matches(&doc));
    }

    #[tokio::test]
    async fn query_stream_yields_and_unsubscribes_on_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();

        let mut stream = QueryStream::new(rx, move || flag.store(true, Ordering::SeqCst));
        tx.send(Ok(Vec::new())).unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(first.is_empty());

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
