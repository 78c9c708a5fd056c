use std::sync::Arc;

use objstore::ObjectStorage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{CacheMap, CatalogError, Result};

/// Why the cache document could not be used. Never surfaced to callers: any of these means
/// "start cold".
#[derive(Debug, Error)]
pub enum CacheUnavailable {
    #[error("cache document does not exist")]
    Missing,

    #[error("cache document is corrupt: {0}")]
    Corrupt(String),

    #[error("cache document could not be read: {0}")]
    Io(String),
}

/// The persisted dataset metadata cache, read and written as one document.
pub struct CacheStore<S: ObjectStorage> {
    storage: Arc<S>,
    obj_type: String,
    cache_id: String,
}

impl<S: ObjectStorage> CacheStore<S> {
    pub fn new(storage: Arc<S>, obj_type: impl Into<String>, cache_id: impl Into<String>) -> Self {
        Self {
            storage,
            obj_type: obj_type.into(),
            cache_id: cache_id.into(),
        }
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn try_load(&self) -> std::result::Result<CacheMap, CacheUnavailable> {
        let doc = self
            .storage
            .read_object(&self.obj_type, &self.cache_id)
            .map_err(|e| match e {
                e if e.is_not_found() => CacheUnavailable::Missing,
                objstore::StorageError::Malformed { reason, .. } => CacheUnavailable::Corrupt(reason),
                e => CacheUnavailable::Io(e.to_string()),
            })?;

        serde_json::from_value(doc).map_err(|e| CacheUnavailable::Corrupt(e.to_string()))
    }

    /// Loads the cache, treating any unavailability as an empty cache.
    pub fn load(&self) -> CacheMap {
        match self.try_load() {
            Ok(entries) => {
                debug!(entries = entries.len(), "dataset cache loaded");
                entries
            }
            Err(reason) => {
                info!(%reason, "dataset cache unavailable, starting cold");
                CacheMap::new()
            }
        }
    }

    /// Overwrites the whole cache document.
    pub fn save(&self, entries: &CacheMap) -> Result<()> {
        let doc = serde_json::to_value(entries).map_err(|e| CatalogError::Write {
            id: self.cache_id.clone(),
            op: "serialize",
            source: objstore::StorageError::Ser(e.to_string()),
        })?;

        self.storage
            .write_object(&self.obj_type, &self.cache_id, &doc)
            .map_err(|source| CatalogError::Write {
                id: self.cache_id.clone(),
                op: "save",
                source,
            })
    }
}
