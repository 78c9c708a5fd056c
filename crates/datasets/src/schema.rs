use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Catalog metadata for one dataset file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,                  // file stem
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub reference: String,
    pub num_of_dataset_prompts: u64,
    pub created_date: String,        // "YYYY-MM-DD HH:MM:SS", local time

    // Only populated by full reads; never cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Value>>,
}

/// Summary fields of a [`DatasetRecord`] plus the content hash they were computed from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub reference: String,
    pub num_of_dataset_prompts: u64,
    pub created_date: String,
    pub hash: String,
}

/// Whole cache document: dataset id -> entry.
pub type CacheMap = BTreeMap<String, CacheEntry>;

impl CacheEntry {
    pub fn from_record(record: &DatasetRecord, hash: impl Into<String>) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            license: record.license.clone(),
            reference: record.reference.clone(),
            num_of_dataset_prompts: record.num_of_dataset_prompts,
            created_date: record.created_date.clone(),
            hash: hash.into(),
        }
    }

    pub fn is_valid_for(&self, current_hash: &str) -> bool {
        self.hash == current_hash
    }

    pub fn to_record(&self) -> DatasetRecord {
        DatasetRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            license: self.license.clone(),
            reference: self.reference.clone(),
            num_of_dataset_prompts: self.num_of_dataset_prompts,
            created_date: self.created_date.clone(),
            examples: None,
        }
    }
}

/// Second-precision local timestamp, e.g. `2024-05-01 09:30:00`.
pub fn format_created_date(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()
}
