//! Index maintenance commands: `seed`, `rebuild`, `embed pending`, `remove`.

use anyhow::{bail, Result};
use std::path::Path;

use erp_search_core::models::ObjectType;
use erp_search_core::projection::ProjectionBuilder;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sources::{seed_from_json, SqliteSources};
use crate::sqlite_store::SqliteIndexStore;

/// Load a JSON seed file into the source tables.
pub async fn run_seed(config: &Config, file: &Path) -> Result<()> {
    let pool = db::connect(config).await?;
    let report = seed_from_json(&pool, file).await?;
    pool.close().await;

    println!("seed {}", file.display());
    println!("  customers:     {}", report.customers);
    println!("  opportunities: {}", report.opportunities);
    println!("  leads:         {}", report.leads);
    println!("  projects:      {}", report.projects);
    println!("  trainings:     {}", report.trainings);
    println!("  purchases:     {}", report.purchases);
    println!("  total:         {}", report.total());
    Ok(())
}

/// Clear the index and project every source row back into it.
pub async fn run_rebuild(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let provider = create_provider(&config.embedding)?;
    let store = SqliteIndexStore::new(pool.clone());
    let sources = SqliteSources::new(pool.clone());

    let report = ProjectionBuilder::new(&store, provider.as_deref())
        .rebuild_index(&sources)
        .await?;
    pool.close().await;

    println!("rebuild");
    println!("  indexed: {}", report.count);
    println!("  embedded: {}", report.embedded);
    println!("  without embedding: {}", report.without_embedding);
    if report.duplicates > 0 {
        println!("  skipped duplicates: {}", report.duplicates);
    }
    Ok(())
}

/// Embed index records that have no vector yet.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let provider = create_provider(&config.embedding)?;
    let store = SqliteIndexStore::new(pool.clone());

    let report = ProjectionBuilder::new(&store, provider.as_deref())
        .backfill_embeddings(limit)
        .await?;
    pool.close().await;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all records up to date");
        return Ok(());
    }
    println!("  pending: {}", report.pending);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.pending - report.embedded);
    Ok(())
}

/// Remove the index entry for one source object.
pub async fn run_remove(config: &Config, object_type: &str, object_id: &str) -> Result<()> {
    let object_type: ObjectType = object_type.parse()?;

    let pool = db::connect(config).await?;
    let store = SqliteIndexStore::new(pool.clone());
    let removed = ProjectionBuilder::new(&store, None)
        .remove_item(object_type, object_id)
        .await?;
    pool.close().await;

    if removed == 0 {
        println!("No index entry for {} {}.", object_type, object_id);
    } else {
        println!("Removed {} {} ({} entries).", object_type, object_id, removed);
    }
    Ok(())
}
