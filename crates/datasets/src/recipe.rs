use std::collections::BTreeMap;

use objstore::ObjectStorage;
use serde::{Deserialize, Serialize};

use crate::{DatasetCatalog, DatasetRecord, Result};

/// Per-dataset prompt counts for a recipe, keyed by dataset id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeStats {
    pub num_of_datasets_prompts: BTreeMap<String, u64>,
}

impl RecipeStats {
    /// Resolves the recipe's datasets through the catalog. Unknown ids fail the whole call.
    /// A recipe without datasets has no prompts.
    pub fn collect<S: ObjectStorage>(catalog: &DatasetCatalog<S>, dataset_ids: &[String]) -> Result<Self> {
        if dataset_ids.is_empty() {
            return Ok(Self::default());
        }
        let (_, records) = catalog.list_available(Some(dataset_ids))?;
        Ok(Self::from_records(&records))
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DatasetRecord>) -> Self {
        let num_of_datasets_prompts = records
            .into_iter()
            .map(|r| (r.id.clone(), r.num_of_dataset_prompts))
            .collect();
        Self { num_of_datasets_prompts }
    }

    pub fn dataset_prompts(&self) -> u64 {
        self.num_of_datasets_prompts.values().fold(0, |acc, n| acc.saturating_add(*n))
    }
}

/// Total prompts a recipe will run: every example is rendered once per prompt template,
/// or once when there are no templates.
pub fn total_prompts(stats: &RecipeStats, prompt_templates: &[String]) -> u64 {
    let renders = prompt_templates.len().max(1) as u64;
    stats.dataset_prompts().saturating_mul(renders)
}
