//! Hybrid search engine over the index store.
//!
//! The engine operates entirely through the [`IndexStore`] trait and an
//! optional [`EmbeddingProvider`], with no database or configuration
//! dependencies. The calling application builds [`SearchParams`] from its
//! config and passes the store and provider in.
//!
//! # Algorithm
//!
//! 1. Lower-case and trim the query. An empty query returns every record
//!    passing the filters, newest first.
//! 2. Semantic retrieval: embed the query and take the top
//!    `semantic_limit` records by cosine similarity (clamped to `[0, 1]`).
//!    Filters do not apply to this step.
//! 3. Keyword retrieval: case-insensitive substring match plus filters,
//!    newest first, capped at `keyword_limit`.
//! 4. Fallback: with no keyword hits but some semantic matches, rank the
//!    semantically matched records instead.
//! 5. Score each candidate (see [`crate::scoring`]) and stable-sort by
//!    hybrid score, descending.
//! 6. When semantic retrieval matched anything, drop candidates below both
//!    the keyword and hybrid relevance thresholds.
//! 7. Compute facets over the full ranked set, then paginate.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::embedding::{embed, EmbeddingProvider};
use crate::models::{FacetCount, IndexRecord, SearchFacets, SearchFilters, SearchResponse};
use crate::scoring::{Scorer, Scores, ScoringWeights};
use crate::store::{IndexStore, KeywordQuery};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Maximum keyword candidates fetched for a non-empty query.
    pub keyword_limit: usize,
    /// Maximum semantic matches fetched.
    pub semantic_limit: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub weights: ScoringWeights,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            keyword_limit: 500,
            semantic_limit: 100,
            default_page_size: 20,
            max_page_size: 100,
            weights: ScoringWeights::default(),
        }
    }
}

/// Body of a search request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// A candidate with its score breakdown.
#[derive(Debug, Clone)]
pub struct RankedRecord {
    pub record: IndexRecord,
    pub scores: Scores,
}

/// Result of one search: the requested page plus aggregate information.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The requested page of ranked records.
    pub ranked: Vec<RankedRecord>,
    pub facets: SearchFacets,
    /// Post-filter, pre-pagination count.
    pub total_count: usize,
    pub page: usize,
    pub size: usize,
    /// Number of semantic matches retrieved for the query.
    pub semantic_matches: usize,
}

impl SearchOutcome {
    pub fn into_response(self) -> SearchResponse {
        SearchResponse {
            results: self.ranked.into_iter().map(|r| r.record).collect(),
            facets: self.facets,
            total_count: self.total_count,
            page: self.page,
            size: self.size,
        }
    }
}

/// Run a hybrid search.
///
/// `provider` is `None` when embeddings are disabled; the search then ranks
/// on keyword scores alone. `now` anchors date-range filters and recency.
pub async fn search<S: IndexStore + ?Sized>(
    store: &S,
    provider: Option<&dyn EmbeddingProvider>,
    req: &SearchRequest,
    params: &SearchParams,
    now: DateTime<Utc>,
) -> Result<SearchOutcome> {
    let query = req.query.trim().to_lowercase();
    let date_from = req.filters.date_range.map(|r| r.cutoff(now));
    let (page, size) = resolve_page(req.page, req.size, params);

    if query.is_empty() {
        let records = store
            .keyword_search(&KeywordQuery {
                text: None,
                filters: &req.filters,
                date_from,
                limit: None,
            })
            .await?;
        let ranked: Vec<RankedRecord> = records
            .into_iter()
            .map(|record| RankedRecord {
                record,
                scores: Scores::default(),
            })
            .collect();
        return Ok(finish(ranked, page, size, 0));
    }

    let mut semantic: HashMap<String, f64> = HashMap::new();
    let mut semantic_order: Vec<String> = Vec::new();
    if let Some(provider) = provider {
        let query_vec = embed(provider, &query).await;
        if !query_vec.is_empty() {
            for m in store
                .vector_search(&query_vec, params.semantic_limit)
                .await?
            {
                let sim = (m.similarity as f64).clamp(0.0, 1.0);
                semantic_order.push(m.id.clone());
                semantic.insert(m.id, sim);
            }
        }
    }

    let mut candidates = store
        .keyword_search(&KeywordQuery {
            text: Some(&query),
            filters: &req.filters,
            date_from,
            limit: Some(params.keyword_limit),
        })
        .await?;
    let keyword_hits = candidates.len();

    if candidates.is_empty() && !semantic.is_empty() {
        candidates = store.get_many(&semantic_order).await?;
    }

    let scorer = Scorer::new(&query, &params.weights, now);
    let mut ranked: Vec<RankedRecord> = candidates
        .into_iter()
        .map(|record| {
            let sim = semantic.get(&record.id).copied().unwrap_or(0.0);
            let scores = scorer.score(&record, sim);
            RankedRecord { record, scores }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.scores
            .hybrid
            .partial_cmp(&a.scores.hybrid)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if !semantic.is_empty() {
        let w = &params.weights;
        ranked.retain(|r| {
            r.scores.keyword >= w.min_keyword_score || r.scores.hybrid >= w.min_hybrid_score
        });
    }

    tracing::debug!(
        query = %query,
        keyword_hits,
        semantic_matches = semantic.len(),
        ranked = ranked.len(),
        "hybrid search complete"
    );

    Ok(finish(ranked, page, size, semantic.len()))
}

fn resolve_page(page: Option<i64>, size: Option<i64>, params: &SearchParams) -> (usize, usize) {
    let page = match page {
        Some(p) if p >= 1 => p as usize,
        _ => 1,
    };
    let size = match size {
        Some(s) if s >= 1 => (s as usize).min(params.max_page_size),
        _ => params.default_page_size,
    };
    (page, size)
}

fn finish(ranked: Vec<RankedRecord>, page: usize, size: usize, semantic_matches: usize) -> SearchOutcome {
    let facets = compute_facets(&ranked);
    let total_count = ranked.len();
    let skip = (page - 1).saturating_mul(size);
    let ranked = ranked.into_iter().skip(skip).take(size).collect();
    SearchOutcome {
        ranked,
        facets,
        total_count,
        page,
        size,
        semantic_matches,
    }
}

/// Per-value counts of `objectType` and non-null `status`, in first-seen order.
pub fn compute_facets(ranked: &[RankedRecord]) -> SearchFacets {
    let mut facets = SearchFacets::default();
    for r in ranked {
        bump(&mut facets.object_type, r.record.object_type.as_str());
        if let Some(status) = r.record.status.as_deref() {
            bump(&mut facets.status, status);
        }
    }
    facets
}

fn bump(counts: &mut Vec<FacetCount>, value: &str) {
    match counts.iter_mut().find(|f| f.value == value) {
        Some(f) => f.count += 1,
        None => counts.push(FacetCount {
            value: value.to_string(),
            count: 1,
        }),
    }
}
