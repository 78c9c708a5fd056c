//! Catalog demo: list, inspect and delete datasets under `CATALOG_DATA_ROOT`.
//!
//! Usage:
//!   catalog-demo list [ids...]
//!   catalog-demo show <id>
//!   catalog-demo total <template-count> <ids...>
//!   catalog-demo delete <id>
//!   catalog-demo prune

mod config;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use datasets::{total_prompts, DatasetCatalog, RecipeStats};
use objstore::FileBackedStorage;
use tracing::info;

use crate::config::AppConfig;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;
    let storage = FileBackedStorage::new(&cfg.data_root)
        .with_context(|| format!("Failed to open data root {}", cfg.data_root.display()))?;
    let root = storage.root().display().to_string();

    let catalog = DatasetCatalog::with_options(Arc::new(storage), cfg.catalog_options());
    info!(%root, obj_type = %catalog.options().obj_type, cache = catalog.cache().cache_id(), "catalog ready");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cmd, rest) = match args.split_first() {
        Some((cmd, rest)) => (cmd.as_str(), rest),
        None => ("list", &args[..]),
    };

    match cmd {
        "list" => {
            let (_, records) = catalog.list_available(Some(rest))?;
            println!("{:<32} {:>10}  {:<19}  {}", "ID", "PROMPTS", "CREATED", "NAME");
            for r in &records {
                println!("{:<32} {:>10}  {:<19}  {}", r.id, r.num_of_dataset_prompts, r.created_date, r.name);
            }
            println!("\n{} dataset(s)", records.len());
        }
        "show" => {
            let Some(id) = rest.first() else { bail!("usage: show <id>") };
            let record = catalog.read(id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        "total" => {
            let Some((n, ids)) = rest.split_first() else { bail!("usage: total <template-count> <ids...>") };
            let n: usize = n.parse().context("template count must be a number")?;
            let templates: Vec<String> = (0..n).map(|i| format!("template-{i}")).collect();
            let stats = RecipeStats::collect(&catalog, ids)?;
            println!(
                "{} prompt(s) across {} dataset(s)",
                total_prompts(&stats, &templates),
                stats.num_of_datasets_prompts.len()
            );
        }
        "delete" => {
            let Some(id) = rest.first() else { bail!("usage: delete <id>") };
            catalog.delete(id)?;
            println!("deleted {id}");
        }
        "prune" => {
            let pruned = catalog.prune_cache()?;
            println!("pruned {} cache entr(ies)", pruned.len());
        }
        other => bail!("unknown command: {other}"),
    }

    Ok(())
}

