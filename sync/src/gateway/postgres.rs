//! PostgreSQL-backed document store.
//!
//! Documents live in one `documents` table as JSONB. Every write issues a
//! `pg_notify` on [`CHANGES_CHANNEL`] with the collection name as payload;
//! live queries listen on that channel and re-run their query.

use async_trait::async_trait;
use bandsync_engine::{Document, Fields};
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;

use super::{FieldQuery, GatewayError, GatewayResult, QueryStream, RemoteGateway, SnapshotSender};

/// Notification channel carrying the name of each changed collection.
pub const CHANGES_CHANNEL: &str = "document_changes";

/// A [`RemoteGateway`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Announce a committed write to live queries.
    ///
    /// The write has already landed, so a failed notification is only
    /// logged; live queries catch up on the next change.
    async fn publish_change(&self, collection: &str) {
        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGES_CHANNEL)
            .bind(collection)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::warn!(collection = %collection, "Failed to publish change: {}", e);
        }
    }
}

fn row_to_document(row: &PgRow) -> GatewayResult<Document> {
    let id: String = row.try_get("id")?;
    let Json(fields): Json<Value> = row.try_get("fields")?;
    match fields {
        Value::Object(fields) => Ok(Document::new(id, fields)),
        other => Err(GatewayError::Decode(format!(
            "document {} holds {} instead of an object",
            id, other
        ))),
    }
}

async fn run_query(pool: &PgPool, query: &FieldQuery) -> GatewayResult<Vec<Document>> {
    let rows = sqlx::query(
        r#"
        SELECT id, fields
        FROM documents
        WHERE collection = $1 AND fields -> $2 = $3
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(&query.collection)
    .bind(&query.field)
    .bind(Json(&query.value))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_document).collect()
}

/// Re-run `query` on every change notification for its collection.
async fn watch(pool: PgPool, mut listener: PgListener, query: FieldQuery, sender: SnapshotSender) {
    if sender.send(run_query(&pool, &query).await).is_err() {
        return;
    }

    loop {
        match listener.recv().await {
            Ok(notification) => {
                if notification.payload() != query.collection {
                    continue;
                }
                if sender.send(run_query(&pool, &query).await).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(collection = %query.collection, "Change listener failed: {}", e);
                let _ = sender.send(Err(GatewayError::Database(e)));
                break;
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for PgGateway {
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> GatewayResult<Vec<Document>> {
        run_query(&self.pool, &FieldQuery::new(collection, field, value.clone())).await
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> GatewayResult<Option<Document>> {
        let row = sqlx::query("SELECT id, fields FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn create(&self, collection: &str, fields: Fields) -> GatewayResult<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, fields)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(Value::Object(fields)))
        .execute(&self.pool)
        .await?;

        self.publish_change(collection).await;
        Ok(id)
    }

    async fn update_by_id(&self, collection: &str, id: &str, fields: Fields) -> GatewayResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET fields = fields || $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(fields)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        self.publish_change(collection).await;
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.publish_change(collection).await;
        }
        Ok(())
    }

    async fn subscribe_query(&self, query: FieldQuery) -> GatewayResult<QueryStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGES_CHANNEL).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let collection = query.collection.clone();
        let task = tokio::spawn(watch(self.pool.clone(), listener, query, sender));

        tracing::debug!(collection = %collection, "Live query started");
        Ok(QueryStream::new(receiver, move || task.abort()))
    }
}
