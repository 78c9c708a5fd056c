use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use objstore::ObjectStorage;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{format_created_date, CacheEntry, CacheMap, CacheStore, CatalogError, DatasetRecord, Result};

const SCALAR_FIELDS: [&str; 4] = ["name", "description", "license", "reference"];

/// Where datasets live and which ids are off limits.
#[derive(Clone, Debug)]
pub struct CatalogOptions {
    pub obj_type: String,
    /// Id of the cache document, stored alongside the datasets.
    pub cache_id: String,
    /// Ids containing this substring are internal/test artifacts.
    pub reserved_marker: String,
    /// Dotted path of the example list inside a dataset file.
    pub examples_path: String,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            obj_type: "datasets".to_string(),
            cache_id: "cache".to_string(),
            reserved_marker: "__".to_string(),
            examples_path: "examples".to_string(),
        }
    }
}

/// Read-through catalog over dataset files.
///
/// Listing trusts a cached entry only while its hash matches the file's current content hash;
/// anything else is re-read by streaming the file and written back in one batch at the end of
/// the pass. Every load-modify-save of the cache document happens under `refresh`.
pub struct DatasetCatalog<S: ObjectStorage> {
    storage: Arc<S>,
    cache: CacheStore<S>,
    opts: CatalogOptions,
    refresh: Mutex<()>,
}

impl<S: ObjectStorage> DatasetCatalog<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_options(storage, CatalogOptions::default())
    }

    pub fn with_options(storage: Arc<S>, opts: CatalogOptions) -> Self {
        let cache = CacheStore::new(storage.clone(), opts.obj_type.clone(), opts.cache_id.clone());
        Self {
            storage,
            cache,
            opts,
            refresh: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.opts
    }

    pub fn cache(&self) -> &CacheStore<S> {
        &self.cache
    }

    pub fn is_reserved(&self, id: &str) -> bool {
        let marker = self.opts.reserved_marker.as_str();
        id == self.opts.cache_id || (!marker.is_empty() && id.contains(marker))
    }

    /// Uncached metadata read. Never consults or mutates the cache.
    pub fn read(&self, id: &str) -> Result<DatasetRecord> {
        let id = self.checked_id(id)?;
        self.read_metadata(id)
    }

    /// Uncached metadata read with the full example list attached.
    pub fn read_with_examples(&self, id: &str) -> Result<DatasetRecord> {
        let id = self.checked_id(id)?;
        let mut record = self.read_metadata(id)?;

        let doc = self
            .storage
            .read_object(&self.opts.obj_type, id)
            .map_err(CatalogError::read(id, "read"))?;
        let examples = lookup(&doc, &self.opts.examples_path)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| CatalogError::InvalidRecord {
                id: id.to_string(),
                reason: format!("{:?} is not a list", self.opts.examples_path),
            })?;

        record.examples = Some(examples);
        Ok(record)
    }

    /// Lists datasets in candidate order, refreshing stale cache entries.
    ///
    /// Candidates are `ids` when given and non-empty (each must exist), otherwise every stored
    /// dataset; `Some(&[])` enumerates like `None`. Reserved ids are dropped before any cache
    /// access.
    pub fn list_available(&self, ids: Option<&[String]>) -> Result<(Vec<String>, Vec<DatasetRecord>)> {
        let ids = ids.filter(|ids| !ids.is_empty());
        let explicit = ids.is_some();
        let candidates: Vec<String> = match ids {
            Some(ids) => ids.iter().map(|id| normalize_id(id).to_string()).collect(),
            None => self
                .storage
                .list_ids(&self.opts.obj_type)
                .map_err(|source| CatalogError::Read {
                    id: self.opts.obj_type.clone(),
                    op: "list",
                    source,
                })?,
        };

        let _guard = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cache = self.cache.load();
        let mut refreshed = 0usize;

        let mut out_ids = Vec::with_capacity(candidates.len());
        let mut records = Vec::with_capacity(candidates.len());

        for id in candidates {
            if self.is_reserved(&id) {
                if explicit {
                    warn!(id = %id, "skipping reserved dataset id");
                }
                continue;
            }

            let (record, updated) = self.resolve(&id, &mut cache)?;
            if updated {
                refreshed += 1;
            }
            out_ids.push(record.id.clone());
            records.push(record);
        }

        if refreshed > 0 {
            self.cache.save(&cache)?;
            info!(refreshed, listed = records.len(), "dataset cache written");
        }

        Ok((out_ids, records))
    }

    /// Deletes the dataset file and purges its cache entry.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let id = self.checked_id(id)?;
        let deleted = self
            .storage
            .delete_object(&self.opts.obj_type, id)
            .map_err(CatalogError::write(id, "delete"))?;

        let _guard = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cache = self.cache.load();
        if cache.remove(id).is_some() {
            self.cache.save(&cache)?;
            debug!(id, "cache entry purged");
        }

        Ok(deleted)
    }

    /// Drops cache entries whose dataset file no longer exists. Returns the dropped ids.
    pub fn prune_cache(&self) -> Result<Vec<String>> {
        let live: BTreeSet<String> = self
            .storage
            .list_ids(&self.opts.obj_type)
            .map_err(|source| CatalogError::Read {
                id: self.opts.obj_type.clone(),
                op: "list",
                source,
            })?
            .into_iter()
            .collect();

        let _guard = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cache = self.cache.load();
        let stale: Vec<String> = cache
            .keys()
            .filter(|id| !live.contains(*id) || self.is_reserved(id))
            .cloned()
            .collect();

        if !stale.is_empty() {
            for id in &stale {
                cache.remove(id);
            }
            self.cache.save(&cache)?;
            info!(pruned = stale.len(), "stale dataset cache entries removed");
        }

        Ok(stale)
    }

    fn checked_id<'a>(&self, id: &'a str) -> Result<&'a str> {
        let id = normalize_id(id);
        if self.is_reserved(id) {
            return Err(CatalogError::Reserved { id: id.to_string() });
        }
        Ok(id)
    }

    /// Returns the record for `id` and whether the cache map was updated.
    fn resolve(&self, id: &str, cache: &mut CacheMap) -> Result<(DatasetRecord, bool)> {
        let current_hash = self
            .storage
            .content_hash(&self.opts.obj_type, id)
            .map_err(CatalogError::read(id, "hash"))?;

        if let Some(entry) = cache.get(id) {
            if entry.is_valid_for(&current_hash) {
                debug!(id, "dataset cache hit");
                return Ok((entry.to_record(), false));
            }
        }

        let mut record = self.read_metadata(id)?;
        record.examples = None;
        cache.insert(id.to_string(), CacheEntry::from_record(&record, current_hash));

        debug!(id, prompts = record.num_of_dataset_prompts, "dataset metadata recomputed");
        Ok((record, true))
    }

    fn read_metadata(&self, id: &str) -> Result<DatasetRecord> {
        let obj_type = self.opts.obj_type.as_str();

        let fields = self
            .storage
            .read_fields(obj_type, id, &SCALAR_FIELDS)
            .map_err(CatalogError::read(id, "read"))?;
        let num_of_dataset_prompts = self
            .storage
            .count_at(obj_type, id, &self.opts.examples_path)
            .map_err(CatalogError::read(id, "count"))?;
        let created = self
            .storage
            .creation_time(obj_type, id)
            .map_err(CatalogError::read(id, "stat"))?;

        Ok(DatasetRecord {
            id: id.to_string(),
            name: required_str(&fields, id, "name")?,
            description: required_str(&fields, id, "description")?,
            license: optional_str(&fields, id, "license")?,
            reference: optional_str(&fields, id, "reference")?,
            num_of_dataset_prompts,
            created_date: format_created_date(created),
            examples: None,
        })
    }
}

/// Accepts either a bare id or a file name (`mmlu.json`).
pub fn normalize_id(id: &str) -> &str {
    id.strip_suffix(".json").unwrap_or(id)
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(doc, |v, key| v.get(key))
}

fn required_str(fields: &Map<String, Value>, id: &str, key: &str) -> Result<String> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid(id, format!("field {key:?} must be a string"))),
        None => Err(invalid(id, format!("missing field {key:?}"))),
    }
}

fn optional_str(fields: &Map<String, Value>, id: &str, key: &str) -> Result<String> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(_) => Err(invalid(id, format!("field {key:?} must be a string"))),
    }
}

fn invalid(id: &str, reason: String) -> CatalogError {
    CatalogError::InvalidRecord {
        id: id.to_string(),
        reason,
    }
}
