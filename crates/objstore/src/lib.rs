//! Object storage for JSON documents
//!
//! Objects are addressed by `(obj_type, id)`. Besides whole-document reads and writes, backends
//! expose streaming primitives (top-level field extraction, element counting, content hashing)
//! so that callers can summarise large documents without materialising them.

mod digest;
mod file;
mod memory;
mod stream;

pub use digest::{hash_bytes, hash_reader};
pub use file::FileBackedStorage;
pub use memory::InMemoryStorage;
pub use stream::{count_at, read_fields};

use std::time::SystemTime;

use serde_json::{Map, Value};
use thiserror::Error;

/// Extension used for every stored object.
pub const EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{obj_type}/{id} not found")]
    NotFound { obj_type: String, id: String },

    #[error("Invalid object id: {0:?}")]
    InvalidId(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed object {obj_type}/{id}: {reason}")]
    Malformed {
        obj_type: String,
        id: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Ser(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn not_found(obj_type: &str, id: &str) -> Self {
        StorageError::NotFound {
            obj_type: obj_type.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn malformed(obj_type: &str, id: &str, reason: impl ToString) -> Self {
        StorageError::Malformed {
            obj_type: obj_type.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Backend for named JSON objects grouped by type.
///
/// Implementations must be safe to share between threads; all methods take `&self`.
pub trait ObjectStorage: Send + Sync {
    /// Reads only the named top-level fields. Missing keys are simply absent from the result.
    fn read_fields(&self, obj_type: &str, id: &str, keys: &[&str]) -> Result<Map<String, Value>>;

    /// Counts the elements of the array at a dotted path (`"examples"`, `"data.rows"`)
    /// without materialising them. A missing path or a non-array value is `Malformed`.
    fn count_at(&self, obj_type: &str, id: &str, path: &str) -> Result<u64>;

    /// Hex BLAKE3 digest of the object's current bytes.
    fn content_hash(&self, obj_type: &str, id: &str) -> Result<String>;

    fn creation_time(&self, obj_type: &str, id: &str) -> Result<SystemTime>;

    fn read_object(&self, obj_type: &str, id: &str) -> Result<Value>;

    /// Replaces the whole object. Readers never observe a partially written document.
    fn write_object(&self, obj_type: &str, id: &str, doc: &Value) -> Result<()>;

    /// Removes the object. Deleting a missing object is `NotFound`.
    fn delete_object(&self, obj_type: &str, id: &str) -> Result<bool>;

    /// Ids of every object of `obj_type`, sorted.
    fn list_ids(&self, obj_type: &str) -> Result<Vec<String>>;
}

/// Rejects ids that could escape the type directory.
pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\\') {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}
