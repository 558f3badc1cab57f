//! `erp-search search`: run a hybrid query from the command line.
//!
//! Output format:
//!
//! ```text
//! 1. [1052.40] Purchase / Laptops for the IT team
//!     ref: PR-2024-001  status: Approved  owner: Budi
//!     id: Purchase-PR-2024-001
//! ```
//!
//! With `--explain`, each hit also shows its keyword, semantic and hybrid
//! scores.

use anyhow::Result;
use chrono::Utc;

use erp_search_core::models::{DateRange, ObjectType, SearchFilters};
use erp_search_core::search::{search, SearchOutcome, SearchRequest};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteIndexStore;

/// Filter flags collected by the CLI.
#[derive(Debug, Clone, Default)]
pub struct FilterArgs {
    pub object_types: Vec<String>,
    pub statuses: Vec<String>,
    pub owner: Option<String>,
    pub department: Option<String>,
    pub date_range: Option<String>,
}

impl FilterArgs {
    /// Validate and convert into [`SearchFilters`].
    pub fn into_filters(self) -> Result<SearchFilters> {
        let object_type = self
            .object_types
            .iter()
            .map(|t| t.parse::<ObjectType>())
            .collect::<Result<Vec<_>>>()?;
        let date_range = self
            .date_range
            .as_deref()
            .map(str::parse::<DateRange>)
            .transpose()?;
        Ok(SearchFilters {
            object_type,
            status: self.statuses,
            owner_id: self.owner,
            department: self.department,
            date_range,
        })
    }
}

/// Open the configured index and run one search.
pub async fn search_index(config: &Config, request: &SearchRequest) -> Result<SearchOutcome> {
    let pool = db::connect(config).await?;
    let store = SqliteIndexStore::new(pool.clone());
    let provider = create_provider(&config.embedding)?;

    let outcome = search(
        &store,
        provider.as_deref(),
        request,
        &config.search_params(),
        Utc::now(),
    )
    .await;
    pool.close().await;
    outcome
}

/// CLI entry point: calls [`search_index`] and prints the page to stdout.
pub async fn run_search(
    config: &Config,
    query: &str,
    filters: FilterArgs,
    page: Option<i64>,
    size: Option<i64>,
    explain: bool,
) -> Result<()> {
    let request = SearchRequest {
        query: query.to_string(),
        filters: filters.into_filters()?,
        page,
        size,
    };
    let outcome = search_index(config, &request).await?;

    if outcome.ranked.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let first = (outcome.page - 1) * outcome.size;
    println!(
        "{} results (page {}, showing {}-{})",
        outcome.total_count,
        outcome.page,
        first + 1,
        first + outcome.ranked.len()
    );
    if explain {
        println!("semantic matches: {}", outcome.semantic_matches);
    }
    println!();

    for (i, hit) in outcome.ranked.iter().enumerate() {
        let r = &hit.record;
        println!(
            "{}. [{:.2}] {} / {}",
            first + i + 1,
            hit.scores.hybrid,
            r.object_type,
            r.title
        );
        if explain {
            println!(
                "    scoring: keyword={:.1}  semantic={:.1}  → hybrid={:.1}",
                hit.scores.keyword, hit.scores.semantic, hit.scores.hybrid
            );
        }
        let mut meta = Vec::new();
        if let Some(ref reference) = r.reference_no {
            meta.push(format!("ref: {}", reference));
        }
        if let Some(ref status) = r.status {
            meta.push(format!("status: {}", status));
        }
        if let Some(ref owner) = r.owner_name {
            meta.push(format!("owner: {}", owner));
        }
        if !meta.is_empty() {
            println!("    {}", meta.join("  "));
        }
        if let Some(ref subtitle) = r.subtitle {
            println!("    {}", subtitle);
        }
        println!("    id: {}", r.id);
        println!();
    }

    println!(
        "facets: {}",
        outcome
            .facets
            .object_type
            .iter()
            .map(|f| format!("{}={}", f.value, f.count))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_args_convert() {
        let args = FilterArgs {
            object_types: vec!["purchase".into(), "CRM".into()],
            statuses: vec!["Approved".into()],
            owner: Some("u1".into()),
            department: None,
            date_range: Some("30days".into()),
        };
        let filters = args.into_filters().unwrap();
        assert_eq!(
            filters.object_type,
            vec![ObjectType::Purchase, ObjectType::Crm]
        );
        assert_eq!(filters.status, vec!["Approved".to_string()]);
        assert_eq!(filters.owner_id.as_deref(), Some("u1"));
        assert_eq!(filters.date_range, Some(DateRange::Days30));
    }

    #[test]
    fn test_filter_args_reject_unknown_values() {
        let bad_type = FilterArgs {
            object_types: vec!["invoice".into()],
            ..FilterArgs::default()
        };
        assert!(bad_type.into_filters().is_err());

        let bad_range = FilterArgs {
            date_range: Some("2weeks".into()),
            ..FilterArgs::default()
        };
        assert!(bad_range.into_filters().is_err());
    }
}
