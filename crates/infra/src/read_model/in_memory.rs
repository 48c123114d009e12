use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use streamlog_events::{ReadModel, ReadModelError};

/// Keyed JSON document store for tests and dev.
///
/// Stacked operations (first argument is always the document key):
/// - `insert [key, doc]`: fails if the key exists
/// - `upsert [key, doc]`
/// - `update [key, fields]`: merges object fields into an existing document
/// - `increment [key, field, by]`: adds to an integer field, creating it at 0
/// - `remove [key]`
///
/// `persist()` applies the queue atomically: if any operation fails, no
/// document changes and the queue is dropped.
#[derive(Debug, Default)]
pub struct InMemoryReadModel {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    initialized: bool,
    documents: BTreeMap<String, JsonValue>,
    queue: Vec<(String, Vec<JsonValue>)>,
    persist_count: usize,
}

impl InMemoryReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, ReadModelError> {
        self.inner
            .read()
            .map_err(|e| ReadModelError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, ReadModelError> {
        self.inner
            .write()
            .map_err(|e| ReadModelError::Storage(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.read().ok()?.documents.get(key).cloned()
    }

    /// All documents, ordered by key.
    pub fn documents(&self) -> Vec<(String, JsonValue)> {
        match self.read() {
            Ok(inner) => inner
                .documents
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Err(_) => vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.documents.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operations waiting for the next `persist()`.
    pub fn pending(&self) -> usize {
        self.read().map(|inner| inner.queue.len()).unwrap_or(0)
    }

    /// How many times `persist()` ran.
    pub fn persist_count(&self) -> usize {
        self.read().map(|inner| inner.persist_count).unwrap_or(0)
    }
}

impl ReadModel for InMemoryReadModel {
    fn init(&self) -> Result<(), ReadModelError> {
        self.write()?.initialized = true;
        debug!("in-memory read model initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.read().map(|inner| inner.initialized).unwrap_or(false)
    }

    fn reset(&self) -> Result<(), ReadModelError> {
        let mut inner = self.write()?;
        inner.documents.clear();
        inner.queue.clear();
        Ok(())
    }

    fn delete(&self) -> Result<(), ReadModelError> {
        let mut inner = self.write()?;
        inner.documents.clear();
        inner.queue.clear();
        inner.initialized = false;
        Ok(())
    }

    fn stack(&self, operation: &str, args: Vec<JsonValue>) {
        match self.write() {
            Ok(mut inner) => inner.queue.push((operation.to_string(), args)),
            Err(err) => warn!(operation, error = %err, "read model operation dropped"),
        }
    }

    fn persist(&self) -> Result<(), ReadModelError> {
        let mut inner = self.write()?;
        if !inner.initialized {
            return Err(ReadModelError::Storage(
                "read model is not initialized".to_string(),
            ));
        }

        let queue = std::mem::take(&mut inner.queue);
        inner.persist_count += 1;

        let mut documents = inner.documents.clone();
        for (operation, args) in &queue {
            apply(&mut documents, operation, args)?;
        }
        inner.documents = documents;
        Ok(())
    }
}

fn apply(
    documents: &mut BTreeMap<String, JsonValue>,
    operation: &str,
    args: &[JsonValue],
) -> Result<(), ReadModelError> {
    let invalid = |reason: &str| ReadModelError::InvalidArguments {
        operation: operation.to_string(),
        reason: reason.to_string(),
    };

    let key = match args.first() {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => return Err(invalid("first argument must be a string or number key")),
    };

    match operation {
        "insert" => {
            let doc = args.get(1).ok_or_else(|| invalid("missing document"))?;
            if documents.contains_key(&key) {
                return Err(invalid("document already exists"));
            }
            documents.insert(key, doc.clone());
        }
        "upsert" => {
            let doc = args.get(1).ok_or_else(|| invalid("missing document"))?;
            documents.insert(key, doc.clone());
        }
        "update" => {
            let Some(JsonValue::Object(fields)) = args.get(1) else {
                return Err(invalid("second argument must be an object"));
            };
            let Some(JsonValue::Object(existing)) = documents.get_mut(&key) else {
                return Err(invalid("no object document under this key"));
            };
            for (field, value) in fields {
                existing.insert(field.clone(), value.clone());
            }
        }
        "increment" => {
            let Some(JsonValue::String(field)) = args.get(1) else {
                return Err(invalid("second argument must be a field name"));
            };
            let by = match args.get(2) {
                None => 1,
                Some(value) => value.as_i64().ok_or_else(|| invalid("increment must be an integer"))?,
            };
            let doc = documents
                .entry(key)
                .or_insert_with(|| JsonValue::Object(Default::default()));
            let JsonValue::Object(object) = doc else {
                return Err(invalid("document is not an object"));
            };
            let current = object.get(field).and_then(JsonValue::as_i64).unwrap_or(0);
            let next = current
                .checked_add(by)
                .ok_or_else(|| invalid("increment overflows i64"))?;
            object.insert(field.clone(), JsonValue::from(next));
        }
        "remove" => {
            documents.remove(&key);
        }
        other => return Err(ReadModelError::UnknownOperation(other.to_string())),
    }
    Ok(())
}
