use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{DEFAULT_BATCH_CEILING, Document, DocumentStore, Fields, StoreError, WriteBatch, WriteOp};

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// In-memory document store for tests/dev.
///
/// Batches are applied to a copy of the data and swapped in only when every
/// operation succeeded. Failures can be injected per commit attempt or per
/// collection read.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Collections>,
    max_batch_size: usize,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    commit_attempts: usize,
    committed: usize,
    fail_commits: HashSet<usize>,
    fail_reads: HashSet<String>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_batch_size: DEFAULT_BATCH_CEILING,
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Insert or replace a document. `value` must be a JSON object.
    pub fn insert(&self, collection: &str, id: &str, value: Value) {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        if let Ok(mut map) = self.inner.write() {
            map.entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), fields);
        }
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Fields> {
        let map = self.inner.read().ok()?;
        map.get(collection)?.get(id).cloned()
    }

    /// Read an integer field, `None` if the document or field is absent.
    pub fn counter(&self, collection: &str, id: &str, field: &str) -> Option<i64> {
        self.get(collection, id)?.get(field)?.as_i64()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .read()
            .map(|map| map.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Make the commit attempt with this zero-based index fail.
    pub fn fail_commit_attempt(&self, attempt: usize) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_commits.insert(attempt);
        }
    }

    /// Make every snapshot read of `collection` fail.
    pub fn fail_reads_of(&self, collection: &str) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_reads.insert(collection.to_string());
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_commits.clear();
            f.fail_reads.clear();
        }
    }

    /// Number of batches committed successfully.
    pub fn committed_batches(&self) -> usize {
        self.faults.lock().map(|f| f.committed).unwrap_or(0)
    }

    pub fn commit_attempts(&self) -> usize {
        self.faults.lock().map(|f| f.commit_attempts).unwrap_or(0)
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

fn apply(data: &mut Collections, op: &WriteOp, now: &str) -> Result<(), StoreError> {
    match op {
        WriteOp::AdjustCounter {
            collection,
            id,
            field,
            delta,
            touch,
        } => {
            let doc = data
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.clone(),
                    id: id.clone(),
                })?;

            let current = match doc.get(field) {
                None | Some(Value::Null) => 0,
                Some(v) => v
                    .as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
                    .ok_or_else(|| StoreError::NotANumber {
                        collection: collection.clone(),
                        id: id.clone(),
                        field: field.clone(),
                    })?,
            };
            let next = current.saturating_add(*delta).max(0);
            doc.insert(field.clone(), Value::from(next));
            if let Some(touch) = touch {
                doc.insert(touch.clone(), Value::String(now.to_string()));
            }
        }
        WriteOp::Delete { collection, id } => {
            if let Some(c) = data.get_mut(collection) {
                c.remove(id);
            }
        }
        WriteOp::Upsert {
            collection,
            id,
            fields,
            server_timestamps,
        } => {
            let doc = data
                .entry(collection.clone())
                .or_default()
                .entry(id.clone())
                .or_default();
            for (k, v) in fields {
                doc.insert(k.clone(), v.clone());
            }
            for field in server_timestamps {
                doc.insert(field.clone(), Value::String(now.to_string()));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        {
            let faults = self.faults.lock().map_err(|_| Self::poisoned())?;
            if faults.fail_reads.contains(collection) {
                return Err(StoreError::Backend(format!(
                    "injected read failure on {collection}"
                )));
            }
        }

        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(map
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| Self::poisoned())?;
        let attempt = faults.commit_attempts;
        faults.commit_attempts += 1;

        if batch.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                limit: self.max_batch_size,
            });
        }
        if faults.fail_commits.contains(&attempt) {
            return Err(StoreError::Backend(format!(
                "injected failure on commit attempt {attempt}"
            )));
        }

        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let mut staged = map.clone();
        let now = Utc::now().to_rfc3339();
        for op in batch.ops() {
            apply(&mut staged, op, &now)?;
        }
        *map = staged;
        faults.committed += 1;
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
