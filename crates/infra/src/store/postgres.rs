//! Postgres-backed document store.
//!
//! Documents live as JSONB rows in a single table keyed by
//! `(collection, id)`. A batch is one SQL transaction. Counter adjustments
//! are a single `UPDATE` computing `GREATEST(current + delta, 0)` in the
//! database, so concurrent writers never overwrite each other's values.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::{DEFAULT_BATCH_CEILING, Document, DocumentStore, Fields, StoreError, WriteBatch, WriteOp};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    data       JSONB NOT NULL DEFAULT '{}'::jsonb,
    PRIMARY KEY (collection, id)
)
"#;

pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    max_batch_size: usize,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            max_batch_size: DEFAULT_BATCH_CEILING,
        }
    }

    /// Connect to `database_url` and wrap the pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Create the `documents` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

async fn apply(tx: &mut Transaction<'_, Postgres>, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::AdjustCounter {
            collection,
            id,
            field,
            delta,
            touch,
        } => {
            let result = sqlx::query(
                r#"
                UPDATE documents
                SET data = jsonb_set(
                    data,
                    ARRAY[$3::text],
                    to_jsonb(GREATEST(COALESCE((data->>$3)::numeric, 0)::bigint + $4, 0))
                )
                WHERE collection = $1 AND id = $2
                "#,
            )
            .bind(collection)
            .bind(id)
            .bind(field)
            .bind(delta)
            .execute(&mut **tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.code().as_deref() == Some("22P02") => {
                    StoreError::NotANumber {
                        collection: collection.clone(),
                        id: id.clone(),
                        field: field.clone(),
                    }
                }
                other => backend(other),
            })?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound {
                    collection: collection.clone(),
                    id: id.clone(),
                });
            }

            if let Some(touch) = touch {
                stamp(tx, collection, id, touch).await?;
            }
        }
        WriteOp::Delete { collection, id } => {
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(backend)?;
        }
        WriteOp::Upsert {
            collection,
            id,
            fields,
            server_timestamps,
        } => {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id)
                DO UPDATE SET data = documents.data || EXCLUDED.data
                "#,
            )
            .bind(collection)
            .bind(id)
            .bind(Value::Object(fields.clone()))
            .execute(&mut **tx)
            .await
            .map_err(backend)?;

            for field in server_timestamps {
                stamp(tx, collection, id, field).await?;
            }
        }
    }
    Ok(())
}

async fn stamp(
    tx: &mut Transaction<'_, Postgres>,
    collection: &str,
    id: &str,
    field: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE documents
        SET data = jsonb_set(data, ARRAY[$3::text], to_jsonb(now()))
        WHERE collection = $1 AND id = $2
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(field)
    .execute(&mut **tx)
    .await
    .map_err(backend)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn read_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, data
            FROM documents
            WHERE collection = $1
            ORDER BY id
            "#,
        )
        .bind(collection)
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(backend)?;
            let data: Value = row.try_get("data").map_err(backend)?;
            let fields = match data {
                Value::Object(map) => map,
                _ => Fields::new(),
            };
            docs.push(Document::new(id, fields));
        }

        debug!(collection, documents = docs.len(), "read collection");
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                limit: self.max_batch_size,
            });
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for op in batch.ops() {
            // Dropping `tx` on error rolls the whole batch back.
            apply(&mut tx, op).await?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
