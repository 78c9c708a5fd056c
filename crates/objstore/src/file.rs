use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::error::Category;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{stream, validate_id, ObjectStorage, Result, StorageError, EXTENSION};

/// One JSON file per object: `<root>/<obj_type>/<id>.json`.
#[derive(Clone, Debug)]
pub struct FileBackedStorage {
    root: PathBuf,
}

impl FileBackedStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, obj_type: &str, id: &str) -> PathBuf {
        self.root.join(obj_type).join(format!("{id}.{EXTENSION}"))
    }

    fn existing_path(&self, obj_type: &str, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        let path = self.object_path(obj_type, id);
        match fs::metadata(&path) {
            Ok(m) if m.is_file() => Ok(path),
            Ok(_) => Err(StorageError::not_found(obj_type, id)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(obj_type, id)),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn open(&self, obj_type: &str, id: &str) -> Result<BufReader<File>> {
        let path = self.existing_path(obj_type, id)?;
        match File::open(&path) {
            Ok(f) => Ok(BufReader::new(f)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(obj_type, id)),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

impl ObjectStorage for FileBackedStorage {
    fn read_fields(&self, obj_type: &str, id: &str, keys: &[&str]) -> Result<Map<String, Value>> {
        let reader = self.open(obj_type, id)?;
        stream::read_fields(reader, keys).map_err(|e| json_err(obj_type, id, e))
    }

    fn count_at(&self, obj_type: &str, id: &str, path: &str) -> Result<u64> {
        let reader = self.open(obj_type, id)?;
        stream::count_at(reader, path)
            .map_err(|e| json_err(obj_type, id, e))?
            .ok_or_else(|| StorageError::malformed(obj_type, id, format!("missing field {path:?}")))
    }

    fn content_hash(&self, obj_type: &str, id: &str) -> Result<String> {
        let reader = self.open(obj_type, id)?;
        crate::hash_reader(reader).map_err(|e| io_err(&self.object_path(obj_type, id), e))
    }

    fn creation_time(&self, obj_type: &str, id: &str) -> Result<SystemTime> {
        let path = self.existing_path(obj_type, id)?;
        let meta = fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        // Not every filesystem records birth time; mtime is the closest stand-in.
        meta.created()
            .or_else(|_| meta.modified())
            .map_err(|e| io_err(&path, e))
    }

    fn read_object(&self, obj_type: &str, id: &str) -> Result<Value> {
        let reader = self.open(obj_type, id)?;
        serde_json::from_reader(reader).map_err(|e| json_err(obj_type, id, e))
    }

    fn write_object(&self, obj_type: &str, id: &str, doc: &Value) -> Result<()> {
        validate_id(id)?;
        let dir = self.root.join(obj_type);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| StorageError::Ser(e.to_string()))?;
        let final_path = self.object_path(obj_type, id);

        // Existing objects are rewritten in place so the inode, and with it the birth time
        // reported by `creation_time`, survives the rewrite.
        match OpenOptions::new().write(true).truncate(true).open(&final_path) {
            Ok(mut file) => {
                file.write_all(&bytes).map_err(|e| io_err(&final_path, e))?;
                file.sync_all().map_err(|e| io_err(&final_path, e))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let tmp_path = dir.join(format!("{id}.{EXTENSION}.tmp"));
                fs::write(&tmp_path, &bytes).map_err(|e| io_err(&tmp_path, e))?;
                fs::rename(&tmp_path, &final_path).map_err(|e| io_err(&final_path, e))?;
            }
            Err(e) => return Err(io_err(&final_path, e)),
        }

        debug!(obj_type, id, size = bytes.len(), "object written");
        Ok(())
    }

    fn delete_object(&self, obj_type: &str, id: &str) -> Result<bool> {
        let path = self.existing_path(obj_type, id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(obj_type, id, "object deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(obj_type, id)),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn list_ids(&self, obj_type: &str) -> Result<Vec<String>> {
        let dir = self.root.join(obj_type);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_err(&dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err(&dir, e))?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_err(obj_type: &str, id: &str, e: serde_json::Error) -> StorageError {
    if e.classify() == Category::Io {
        return StorageError::Io {
            path: format!("{obj_type}/{id}"),
            source: std::io::Error::new(ErrorKind::Other, e.to_string()),
        };
    }
    StorageError::malformed(obj_type, id, e)
}
