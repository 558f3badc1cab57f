//! `erp-search facets` and `erp-search stats`.

use anyhow::Result;

use erp_search_core::facets::{get_facets, get_stats};
use erp_search_core::models::FacetCount;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteIndexStore;

fn print_facet(name: &str, counts: &[FacetCount]) {
    println!("{}:", name);
    if counts.is_empty() {
        println!("  (none)");
    }
    for f in counts {
        println!("  {:<24} {}", f.value, f.count);
    }
}

/// Print index-wide facet counts, or JSON with `--json`.
pub async fn run_facets(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let facets = get_facets(&SqliteIndexStore::new(pool.clone())).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&facets)?);
        return Ok(());
    }

    print_facet("objectType", &facets.object_type);
    print_facet("status", &facets.status);
    print_facet("department", &facets.department);
    print_facet("owner", &facets.owner);
    Ok(())
}

/// Print record totals per object type, or JSON with `--json`.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = get_stats(&SqliteIndexStore::new(pool.clone())).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("search index");
    println!("  total records: {}", stats.total_count);
    for t in &stats.by_type {
        println!("  {:<10} {}", t.object_type, t.count);
    }
    println!("  with embedding: {}", stats.embedded);
    Ok(())
}
