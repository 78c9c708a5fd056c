use std::path::PathBuf;

use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_root: PathBuf,
    pub datasets_dir: String,
    pub cache_id: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let data_root = get("CATALOG_DATA_ROOT")?;
        let datasets_dir = std::env::var("CATALOG_DATASETS_DIR").unwrap_or_else(|_| "datasets".to_string());
        let cache_id = std::env::var("CATALOG_CACHE_ID").unwrap_or_else(|_| "cache".to_string());

        if data_root.trim().is_empty() {
            bail!("CATALOG_DATA_ROOT must not be empty");
        }
        if datasets_dir.contains('/') || datasets_dir.is_empty() {
            bail!("CATALOG_DATASETS_DIR must be a single directory name");
        }

        Ok(Self {
            data_root: PathBuf::from(data_root),
            datasets_dir,
            cache_id,
        })
    }

    pub fn catalog_options(&self) -> datasets::CatalogOptions {
        datasets::CatalogOptions {
            obj_type: self.datasets_dir.clone(),
            cache_id: self.cache_id.clone(),
            ..Default::default()
        }
    }
}

fn get(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Missing required env var: {key}"))
}
