use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde_json::{Map, Value};

use crate::{stream, validate_id, ObjectStorage, Result, StorageError};

#[derive(Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    created: SystemTime,
}

type Objects = BTreeMap<(String, String), StoredObject>;

/// In-memory storage (for testing and demos)
///
/// Objects are kept as raw bytes so that malformed documents can be stored and the streaming
/// primitives behave exactly as they do against files.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<Objects>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes, keeping the original creation time when the object already exists.
    pub fn put_raw(&self, obj_type: &str, id: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        validate_id(id)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let key = (obj_type.to_string(), id.to_string());
        let created = data.get(&key).map(|o| o.created).unwrap_or_else(SystemTime::now);
        data.insert(
            key,
            StoredObject {
                bytes: bytes.into(),
                created,
            },
        );
        Ok(())
    }

    pub fn contains(&self, obj_type: &str, id: &str) -> bool {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(&(obj_type.to_string(), id.to_string()))
    }

    fn bytes(&self, obj_type: &str, id: &str) -> Result<Vec<u8>> {
        self.with_object(obj_type, id, |o| o.bytes.clone())
    }

    fn with_object<R>(&self, obj_type: &str, id: &str, f: impl FnOnce(&StoredObject) -> R) -> Result<R> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(&(obj_type.to_string(), id.to_string()))
            .map(f)
            .ok_or_else(|| StorageError::not_found(obj_type, id))
    }
}

impl ObjectStorage for InMemoryStorage {
    fn read_fields(&self, obj_type: &str, id: &str, keys: &[&str]) -> Result<Map<String, Value>> {
        let bytes = self.bytes(obj_type, id)?;
        stream::read_fields(bytes.as_slice(), keys).map_err(|e| StorageError::malformed(obj_type, id, e))
    }

    fn count_at(&self, obj_type: &str, id: &str, path: &str) -> Result<u64> {
        let bytes = self.bytes(obj_type, id)?;
        stream::count_at(bytes.as_slice(), path)
            .map_err(|e| StorageError::malformed(obj_type, id, e))?
            .ok_or_else(|| StorageError::malformed(obj_type, id, format!("missing field {path:?}")))
    }

    fn content_hash(&self, obj_type: &str, id: &str) -> Result<String> {
        self.with_object(obj_type, id, |o| crate::hash_bytes(&o.bytes))
    }

    fn creation_time(&self, obj_type: &str, id: &str) -> Result<SystemTime> {
        self.with_object(obj_type, id, |o| o.created)
    }

    fn read_object(&self, obj_type: &str, id: &str) -> Result<Value> {
        let bytes = self.bytes(obj_type, id)?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::malformed(obj_type, id, e))
    }

    fn write_object(&self, obj_type: &str, id: &str, doc: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(doc).map_err(|e| StorageError::Ser(e.to_string()))?;
        self.put_raw(obj_type, id, bytes)
    }

    fn delete_object(&self, obj_type: &str, id: &str) -> Result<bool> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(&(obj_type.to_string(), id.to_string()))
            .map(|_| true)
            .ok_or_else(|| StorageError::not_found(obj_type, id))
    }

    fn list_ids(&self, obj_type: &str) -> Result<Vec<String>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .keys()
            .filter(|(t, _)| t == obj_type)
            .map(|(_, id)| id.clone())
            .collect())
    }
}
