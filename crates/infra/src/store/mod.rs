//! Document store boundary.
//!
//! The engine talks to the backing document database only through
//! [`DocumentStore`]: full-collection snapshot reads and atomic batch commits
//! of a closed set of write operations. Every mutation is expressed as a
//! server-side operation (relative adjustment, delete, upsert), never as a
//! read-modify-write of a whole document.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// Highest number of operations a single atomic batch may carry.
pub const DEFAULT_BATCH_CEILING: usize = 500;

/// One document as returned by a snapshot read.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// `field += delta`, floored at zero, evaluated by the store.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    AdjustCounter {
        collection: String,
        id: String,
        field: String,
        delta: i64,
        /// Field stamped with the server's commit time.
        touch: Option<String>,
    },
    /// Remove a document. Deleting an absent document is a no-op.
    Delete { collection: String, id: String },
    /// Create or merge a document.
    Upsert {
        collection: String,
        id: String,
        fields: Fields,
        /// Fields set to the server's commit time.
        server_timestamps: Vec<String>,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::AdjustCounter { collection, .. }
            | WriteOp::Delete { collection, .. }
            | WriteOp::Upsert { collection, .. } => collection,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            WriteOp::AdjustCounter { id, .. } | WriteOp::Delete { id, .. } | WriteOp::Upsert { id, .. } => {
                id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::AdjustCounter { .. } => "adjust",
            WriteOp::Delete { .. } => "delete",
            WriteOp::Upsert { .. } => "upsert",
        }
    }
}

/// Ordered operations committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new(ops: Vec<WriteOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("batch of {size} operations exceeds store limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error("field {field} of {collection}/{id} is not a number")]
    NotANumber {
        collection: String,
        id: String,
        field: String,
    },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("storage error: {0}")]
    Backend(String),
}

/// Async document store abstraction.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read every document of a collection, ordered by id.
    async fn read_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Commit all operations of a batch atomically, in order.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// The store's ceiling on operations per batch.
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_CEILING
    }
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn read_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        (**self).read_all(collection).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).commit(batch).await
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }
}
