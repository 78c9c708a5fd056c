use objstore::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Dataset {id} does not exist.")]
    NotFound { id: String },

    #[error("Dataset id {id:?} is reserved")]
    Reserved { id: String },

    #[error("Failed to {op} dataset {id}: {source}")]
    Read {
        id: String,
        op: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Dataset {id} is malformed: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Failed to {op} {id}: {source}")]
    Write {
        id: String,
        op: &'static str,
        #[source]
        source: StorageError,
    },
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Maps a storage failure during a dataset read; a missing object becomes `NotFound`.
    pub(crate) fn read<'a>(id: &'a str, op: &'static str) -> impl FnOnce(StorageError) -> CatalogError + 'a {
        move |source| {
            if source.is_not_found() {
                CatalogError::NotFound { id: id.to_string() }
            } else {
                CatalogError::Read {
                    id: id.to_string(),
                    op,
                    source,
                }
            }
        }
    }

    pub(crate) fn write<'a>(id: &'a str, op: &'static str) -> impl FnOnce(StorageError) -> CatalogError + 'a {
        move |source| {
            if source.is_not_found() {
                CatalogError::NotFound { id: id.to_string() }
            } else {
                CatalogError::Write {
                    id: id.to_string(),
                    op,
                    source,
                }
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}
