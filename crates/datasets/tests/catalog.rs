use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use datasets::{total_prompts, CatalogError, DatasetCatalog, RecipeStats};
use objstore::{FileBackedStorage, InMemoryStorage, ObjectStorage};
use serde_json::{json, Map, Value};

/// Counts calls into the storage primitives, per operation and id.
#[derive(Default)]
struct SpyStorage {
    inner: InMemoryStorage,
    calls: Mutex<HashMap<(&'static str, String), usize>>,
    cache_writes: AtomicUsize,
}

impl SpyStorage {
    fn record(&self, op: &'static str, id: &str) {
        *self.calls.lock().unwrap().entry((op, id.to_string())).or_default() += 1;
    }

    fn calls(&self, op: &'static str, id: &str) -> usize {
        self.calls.lock().unwrap().get(&(op, id.to_string())).copied().unwrap_or(0)
    }

    fn count_calls(&self, id: &str) -> usize {
        self.calls("count_at", id)
    }

    fn cache_writes(&self) -> usize {
        self.cache_writes.load(Ordering::SeqCst)
    }
}

impl ObjectStorage for SpyStorage {
    fn read_fields(&self, obj_type: &str, id: &str, keys: &[&str]) -> objstore::Result<Map<String, Value>> {
        self.record("read_fields", id);
        self.inner.read_fields(obj_type, id, keys)
    }

    fn count_at(&self, obj_type: &str, id: &str, path: &str) -> objstore::Result<u64> {
        self.record("count_at", id);
        self.inner.count_at(obj_type, id, path)
    }

    fn content_hash(&self, obj_type: &str, id: &str) -> objstore::Result<String> {
        self.inner.content_hash(obj_type, id)
    }

    fn creation_time(&self, obj_type: &str, id: &str) -> objstore::Result<SystemTime> {
        self.record("creation_time", id);
        self.inner.creation_time(obj_type, id)
    }

    fn read_object(&self, obj_type: &str, id: &str) -> objstore::Result<Value> {
        self.record("read_object", id);
        self.inner.read_object(obj_type, id)
    }

    fn write_object(&self, obj_type: &str, id: &str, doc: &Value) -> objstore::Result<()> {
        if id == "cache" {
            self.cache_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.write_object(obj_type, id, doc)
    }

    fn delete_object(&self, obj_type: &str, id: &str) -> objstore::Result<bool> {
        self.inner.delete_object(obj_type, id)
    }

    fn list_ids(&self, obj_type: &str) -> objstore::Result<Vec<String>> {
        self.inner.list_ids(obj_type)
    }
}

fn dataset(name: &str, n: usize) -> Value {
    let examples: Vec<Value> = (0..n)
        .map(|i| json!({"input": format!("{name} prompt {i}"), "target": "yes"}))
        .collect();
    json!({
        "name": name,
        "description": format!("{name} description"),
        "license": "MIT",
        "reference": "https://example.org",
        "examples": examples,
    })
}

fn setup(sets: &[(&str, usize)]) -> (Arc<SpyStorage>, DatasetCatalog<SpyStorage>) {
    let storage = Arc::new(SpyStorage::default());
    for (id, n) in sets {
        storage.write_object("datasets", id, &dataset(id, *n)).unwrap();
    }
    let catalog = DatasetCatalog::new(storage.clone());
    (storage, catalog)
}

fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_unchanged_dataset_served_from_cache() {
    let (storage, catalog) = setup(&[("arc", 12), ("mmlu", 30)]);

    let (ids1, first) = catalog.list_available(None).unwrap();
    assert_eq!(storage.count_calls("arc"), 1);
    assert_eq!(storage.count_calls("mmlu"), 1);

    let (ids2, second) = catalog.list_available(None).unwrap();
    for id in ["arc", "mmlu"] {
        assert_eq!(storage.calls("count_at", id), 1);
        assert_eq!(storage.calls("read_fields", id), 1);
        assert_eq!(storage.calls("creation_time", id), 1);
        assert_eq!(storage.calls("read_object", id), 0);
    }

    assert_eq!(ids1, ids2);
    assert_eq!(first, second);
}

#[test]
fn test_changed_dataset_is_recomputed() {
    let (storage, catalog) = setup(&[("arc", 12), ("mmlu", 30)]);
    catalog.list_available(None).unwrap();
    let hash_before = catalog.cache().load()["arc"].hash.clone();

    storage.write_object("datasets", "arc", &dataset("arc", 15)).unwrap();

    let (_, records) = catalog.list_available(None).unwrap();
    let arc = records.iter().find(|r| r.id == "arc").unwrap();
    assert_eq!(arc.num_of_dataset_prompts, 15);
    assert_eq!(storage.count_calls("arc"), 2);
    assert_eq!(storage.count_calls("mmlu"), 1);

    let entry = &catalog.cache().load()["arc"];
    assert_ne!(entry.hash, hash_before);
    assert_eq!(entry.hash, storage.content_hash("datasets", "arc").unwrap());
    assert_eq!(entry.num_of_dataset_prompts, 15);
}

#[test]
fn test_reserved_ids_never_listed() {
    let (storage, catalog) = setup(&[("arc", 3), ("sample__internal", 4)]);
    storage.inner.put_raw("datasets", "__scratch", "not even json").unwrap();

    let (listed, _) = catalog.list_available(None).unwrap();
    assert_eq!(listed, vec!["arc"]);

    // the cache document now exists among enumerated objects
    let cache_id = catalog.cache().cache_id().to_string();
    assert!(storage.list_ids("datasets").unwrap().contains(&cache_id));
    let (listed, _) = catalog.list_available(None).unwrap();
    assert_eq!(listed, vec!["arc"]);

    let (listed, _) = catalog
        .list_available(Some(&ids(&["cache", "sample__internal", "arc.json"])[..]))
        .unwrap();
    assert_eq!(listed, vec!["arc"]);

    let cache = catalog.cache().load();
    assert_eq!(cache.keys().collect::<Vec<_>>(), vec!["arc"]);
    assert_eq!(storage.count_calls("sample__internal"), 0);
}

#[test]
fn test_prompt_count_matches_examples() {
    let (_, catalog) = setup(&[("bbq", 57)]);

    let record = catalog.read("bbq").unwrap();
    assert_eq!(record.num_of_dataset_prompts, 57);
    assert_eq!(record.examples, None);

    let (_, records) = catalog.list_available(None).unwrap();
    assert_eq!(records[0].num_of_dataset_prompts, 57);
    assert_eq!(records[0].name, "bbq");
    assert_eq!(records[0].license, "MIT");
}

#[test]
fn test_refresh_writes_cache_once() {
    let (storage, catalog) = setup(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);

    catalog.list_available(None).unwrap();
    assert_eq!(storage.cache_writes(), 1);
    assert_eq!(catalog.cache().load().len(), 4);

    catalog.list_available(None).unwrap();
    assert_eq!(storage.cache_writes(), 1);

    storage.write_object("datasets", "b", &dataset("b", 9)).unwrap();
    storage.write_object("datasets", "d", &dataset("d", 9)).unwrap();
    catalog.list_available(None).unwrap();
    assert_eq!(storage.cache_writes(), 2);
}

#[test]
fn test_listing_preserves_requested_order() {
    let (_, catalog) = setup(&[("a", 1), ("b", 2), ("c", 3)]);

    let (listed, records) = catalog.list_available(Some(&ids(&["c", "a", "b"])[..])).unwrap();
    assert_eq!(listed, vec!["c", "a", "b"]);
    let counts: Vec<u64> = records.iter().map(|r| r.num_of_dataset_prompts).collect();
    assert_eq!(counts, vec![3, 1, 2]);
}

#[test]
fn test_recipe_totals() {
    let (_, catalog) = setup(&[("ten", 10), ("twenty", 20), ("unused", 5)]);

    let stats = RecipeStats::collect(&catalog, &ids(&["ten", "twenty"])).unwrap();
    assert_eq!(stats.num_of_datasets_prompts["ten"], 10);
    assert_eq!(total_prompts(&stats, &ids(&["mmlu", "analogical-similarity"])), 60);
    assert_eq!(total_prompts(&stats, &[]), 30);

    let err = RecipeStats::collect(&catalog, &ids(&["ten", "nope"])).unwrap_err();
    assert_eq!(err.to_string(), "Dataset nope does not exist.");
}

#[test]
fn test_cold_start_after_cache_loss() {
    let (storage, catalog) = setup(&[("a", 1), ("b", 2)]);
    catalog.list_available(None).unwrap();

    storage.inner.put_raw("datasets", "cache", "{\"a\": {\"trunc").unwrap();
    let (listed, _) = catalog.list_available(None).unwrap();
    assert_eq!(listed, vec!["a", "b"]);
    assert_eq!(storage.count_calls("a"), 2);
    assert_eq!(catalog.cache().load().len(), 2);

    storage.delete_object("datasets", "cache").unwrap();
    let (listed, _) = catalog.list_available(None).unwrap();
    assert_eq!(listed, vec!["a", "b"]);
    assert_eq!(storage.count_calls("b"), 3);
}

#[test]
fn test_explicit_missing_id_fails() {
    let (storage, catalog) = setup(&[("a", 1)]);

    let err = catalog.list_available(Some(&ids(&["a", "ghost"])[..])).unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { ref id } if id == "ghost"));
    // a failed pass persists nothing
    assert_eq!(storage.cache_writes(), 0);

    assert!(catalog.read("ghost").unwrap_err().is_not_found());
}

#[test]
fn test_malformed_dataset_fails_with_context() {
    let (storage, catalog) = setup(&[("good", 2)]);
    storage.inner.put_raw("datasets", "broken", "{\"name\": \"x\", \"examples\": [1, 2").unwrap();
    storage
        .write_object("datasets", "nameless", &json!({"description": "d", "examples": []}))
        .unwrap();

    let err = catalog.list_available(Some(&ids(&["broken"])[..])).unwrap_err();
    assert!(matches!(err, CatalogError::Read { ref id, .. } if id == "broken"));

    let err = catalog.read("nameless").unwrap_err();
    assert!(matches!(err, CatalogError::InvalidRecord { ref id, .. } if id == "nameless"));

    let err = catalog.list_available(None).unwrap_err();
    assert!(err.to_string().contains("broken"));
}

#[test]
fn test_missing_optional_fields_default_empty() {
    let (storage, catalog) = setup(&[]);
    storage
        .write_object(
            "datasets",
            "bare",
            &json!({"name": "Bare", "description": "", "license": null, "examples": [{}]}),
        )
        .unwrap();

    let record = catalog.read("bare").unwrap();
    assert_eq!(record.license, "");
    assert_eq!(record.reference, "");
    assert_eq!(record.num_of_dataset_prompts, 1);
}

#[test]
fn test_read_with_examples_leaves_cache_alone() {
    let (storage, catalog) = setup(&[("arc", 4)]);

    let record = catalog.read_with_examples("arc").unwrap();
    let examples = record.examples.unwrap();
    assert_eq!(examples.len(), 4);
    assert_eq!(examples[0]["input"], "arc prompt 0");

    assert_eq!(storage.cache_writes(), 0);
    assert!(catalog.cache().load().is_empty());
}

#[test]
fn test_delete_purges_cache_entry() {
    let (storage, catalog) = setup(&[("a", 1), ("b", 2)]);
    catalog.list_available(None).unwrap();

    assert!(catalog.delete("a").unwrap());
    assert!(!storage.inner.contains("datasets", "a"));
    assert!(!catalog.cache().load().contains_key("a"));
    assert!(catalog.cache().load().contains_key("b"));

    assert!(catalog.delete("a").unwrap_err().is_not_found());
    assert!(matches!(catalog.delete("cache"), Err(CatalogError::Reserved { .. })));
}

#[test]
fn test_delete_uncached_dataset_skips_cache_write() {
    let (storage, catalog) = setup(&[("a", 1)]);
    assert!(catalog.delete("a").unwrap());
    assert_eq!(storage.cache_writes(), 0);
}

#[test]
fn test_prune_cache_drops_vanished_datasets() {
    let (storage, catalog) = setup(&[("a", 1), ("b", 2)]);
    catalog.list_available(None).unwrap();

    // removed behind the catalog's back
    storage.delete_object("datasets", "b").unwrap();

    assert_eq!(catalog.prune_cache().unwrap(), vec!["b"]);
    assert_eq!(catalog.cache().load().keys().collect::<Vec<_>>(), vec!["a"]);
    assert!(catalog.prune_cache().unwrap().is_empty());
}

#[test]
fn test_concurrent_listings_keep_every_entry() {
    let names: Vec<String> = (0..16).map(|i| format!("set-{i:02}")).collect();
    let storage = Arc::new(SpyStorage::default());
    for (i, name) in names.iter().enumerate() {
        storage.write_object("datasets", name, &dataset(name, i + 1)).unwrap();
    }
    let catalog = Arc::new(DatasetCatalog::new(storage.clone()));

    let handles: Vec<_> = names
        .chunks(4)
        .map(|chunk| {
            let catalog = catalog.clone();
            let chunk = chunk.to_vec();
            std::thread::spawn(move || catalog.list_available(Some(&chunk[..])).unwrap())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let cache = catalog.cache().load();
    assert_eq!(cache.len(), 16);
    for (i, name) in names.iter().enumerate() {
        assert_eq!(cache[name].num_of_dataset_prompts, (i + 1) as u64);
    }
}

#[test]
fn test_file_backed_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileBackedStorage::new(dir.path()).unwrap());
    storage.write_object("datasets", "truthful-qa", &dataset("truthful-qa", 817)).unwrap();
    storage.write_object("datasets", "winogrande", &dataset("winogrande", 40)).unwrap();

    let catalog = DatasetCatalog::new(storage.clone());
    let (listed, records) = catalog.list_available(None).unwrap();
    assert_eq!(listed, vec!["truthful-qa", "winogrande"]);
    assert_eq!(records[0].num_of_dataset_prompts, 817);
    assert!(dir.path().join("datasets/cache.json").exists());

    let cache: Value = serde_json::from_slice(&std::fs::read(dir.path().join("datasets/cache.json")).unwrap()).unwrap();
    assert!(cache["winogrande"].get("examples").is_none());
    assert_eq!(cache["winogrande"]["num_of_dataset_prompts"], 40);

    // a fresh catalog over the same directory reuses the persisted cache
    let again = DatasetCatalog::new(storage);
    let (_, second) = again.list_available(None).unwrap();
    assert_eq!(records, second);
}

#[test]
fn test_created_date_survives_content_change() {
    let (storage, catalog) = setup(&[("arc", 2)]);
    let (_, first) = catalog.list_available(None).unwrap();

    std::thread::sleep(Duration::from_millis(1100));
    storage.write_object("datasets", "arc", &dataset("arc", 5)).unwrap();

    let (_, second) = catalog.list_available(None).unwrap();
    assert_eq!(second[0].num_of_dataset_prompts, 5);
    assert_eq!(second[0].created_date, first[0].created_date);
    assert_eq!(catalog.read("arc").unwrap().created_date, first[0].created_date);
}

#[test]
fn test_file_backed_created_date_survives_content_change() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileBackedStorage::new(dir.path()).unwrap());
    storage.write_object("datasets", "arc", &dataset("arc", 2)).unwrap();
    // mtime stands in for birth time where the filesystem has none, and mtime moves on rewrite
    if std::fs::metadata(storage.object_path("datasets", "arc")).unwrap().created().is_err() {
        return;
    }

    let catalog = DatasetCatalog::new(storage.clone());
    let before = catalog.read("arc").unwrap().created_date;

    std::thread::sleep(Duration::from_millis(1100));
    storage.write_object("datasets", "arc", &dataset("arc", 5)).unwrap();

    let (_, records) = catalog.list_available(None).unwrap();
    assert_eq!(records[0].num_of_dataset_prompts, 5);
    assert_eq!(records[0].created_date, before);
}

#[test]
fn test_read_rejects_reserved_ids() {
    let (storage, catalog) = setup(&[("arc", 1)]);
    catalog.list_available(None).unwrap();

    let cache_id = catalog.options().cache_id.clone();
    assert!(matches!(catalog.read(&cache_id), Err(CatalogError::Reserved { .. })));
    assert!(matches!(
        catalog.read_with_examples("sample__internal.json"),
        Err(CatalogError::Reserved { .. })
    ));
    assert_eq!(storage.calls("read_fields", &cache_id), 0);
}

#[test]
fn test_empty_id_list_lists_everything() {
    let (_, catalog) = setup(&[("a", 1), ("b", 2)]);

    let (listed, _) = catalog.list_available(Some(&ids(&[])[..])).unwrap();
    assert_eq!(listed, vec!["a", "b"]);

    let stats = RecipeStats::collect(&catalog, &[]).unwrap();
    assert!(stats.num_of_datasets_prompts.is_empty());
    assert_eq!(total_prompts(&stats, &ids(&["t"])), 0);
}
