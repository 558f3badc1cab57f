//! Relevance scoring for hybrid search.
//!
//! Scores are additive points. A record's keyword score rewards matches on
//! the reference number, title, object id and status plus a small recency
//! bonus. When the record also has a semantic similarity, keyword and
//! semantic signals are fused and the semantic, domain and software boosts
//! are added on top.
//!
//! # Hybrid Formula
//!
//! ```text
//! semantic > 0:
//!     hybrid = (keyword_weight × keyword / keyword_scale
//!               + semantic_weight × semantic) × keyword_scale
//!              + semantic_boost + domain_boost + software_boost
//! otherwise:
//!     hybrid = keyword
//! ```
//!
//! Every point value and threshold lives in [`ScoringWeights`], which is
//! loaded from the `[scoring]` config table.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{IndexRecord, ObjectType};

/// Point values and thresholds used by the scorer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub reference_exact: f64,
    pub reference_prefix: f64,
    pub reference_contains: f64,
    pub title_exact: f64,
    pub title_prefix: f64,
    pub title_contains: f64,
    pub object_id_exact: f64,
    pub status_exact: f64,
    pub status_contains: f64,
    /// Records updated within this many days earn `window - age` points.
    pub recency_window_days: f64,
    /// `(threshold, points)` pairs, checked in order with a strict `>`.
    pub semantic_tiers: Vec<(f64, f64)>,
    pub domain_boost: f64,
    pub software_boost: f64,
    pub keyword_weight: f64,
    pub semantic_weight: f64,
    pub keyword_scale: f64,
    /// Relevance filter: keyword score at or above this keeps a record.
    pub min_keyword_score: f64,
    /// Relevance filter: hybrid score at or above this keeps a record.
    pub min_hybrid_score: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            reference_exact: 1000.0,
            reference_prefix: 800.0,
            reference_contains: 500.0,
            title_exact: 400.0,
            title_prefix: 200.0,
            title_contains: 100.0,
            object_id_exact: 50.0,
            status_exact: 300.0,
            status_contains: 150.0,
            recency_window_days: 10.0,
            semantic_tiers: vec![(0.7, 500.0), (0.5, 200.0), (0.3, 100.0)],
            domain_boost: 1000.0,
            software_boost: 800.0,
            keyword_weight: 0.1,
            semantic_weight: 0.9,
            keyword_scale: 1000.0,
            min_keyword_score: 100.0,
            min_hybrid_score: 100.0,
        }
    }
}

/// Bilingual (Indonesian/English) query terms that name a module.
const DOMAIN_TERMS: &[(&str, ObjectType)] = &[
    ("pembelian", ObjectType::Purchase),
    ("beli", ObjectType::Purchase),
    ("procurement", ObjectType::Purchase),
    ("purchase", ObjectType::Purchase),
    ("pelatihan", ObjectType::Training),
    ("training", ObjectType::Training),
    ("kursus", ObjectType::Training),
    ("proyek", ObjectType::Pmo),
    ("project", ObjectType::Pmo),
    ("konstruksi", ObjectType::Pmo),
    ("construction", ObjectType::Pmo),
    ("pelanggan", ObjectType::Crm),
    ("customer", ObjectType::Crm),
    ("client", ObjectType::Crm),
    ("klien", ObjectType::Crm),
];

const SOFTWARE_QUERY_TERMS: &[&str] = &[
    "aplikasi",
    "software",
    "application",
    "app",
    "program",
    "licence",
    "license",
];

const SOFTWARE_CONTENT_TERMS: &[&str] = &["software", "license", "application", "app"];

/// The module a whole-query domain term points at, if any.
pub fn domain_for_query(query: &str) -> Option<ObjectType> {
    DOMAIN_TERMS
        .iter()
        .find(|(term, _)| *term == query)
        .map(|(_, t)| *t)
}

/// Per-record score breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scores {
    pub keyword: f64,
    pub semantic: f64,
    pub hybrid: f64,
}

/// Scores records against one lower-cased, trimmed query.
pub struct Scorer<'a> {
    query: &'a str,
    weights: &'a ScoringWeights,
    now: DateTime<Utc>,
    domain: Option<ObjectType>,
    software_query: bool,
}

impl<'a> Scorer<'a> {
    pub fn new(query: &'a str, weights: &'a ScoringWeights, now: DateTime<Utc>) -> Self {
        Self {
            query,
            weights,
            now,
            domain: domain_for_query(query),
            software_query: SOFTWARE_QUERY_TERMS.contains(&query),
        }
    }

    /// Lexical score for `record`.
    pub fn keyword_score(&self, record: &IndexRecord) -> f64 {
        let w = self.weights;
        let q = self.query;
        let mut score = 0.0;

        if let Some(reference) = record.reference_no.as_deref() {
            score += tiered(
                &reference.to_lowercase(),
                q,
                w.reference_exact,
                w.reference_prefix,
                w.reference_contains,
            );
        }

        score += tiered(
            &record.title.to_lowercase(),
            q,
            w.title_exact,
            w.title_prefix,
            w.title_contains,
        );

        if record.object_id.to_lowercase() == q {
            score += w.object_id_exact;
        }

        if let Some(status) = record.status.as_deref() {
            let status = status.to_lowercase();
            if status == q {
                score += w.status_exact;
            } else if status.contains(q) {
                score += w.status_contains;
            }
        }

        let age_days = (self.now - record.updated_at).num_seconds() as f64 / 86_400.0;
        score += (w.recency_window_days - age_days).max(0.0);

        score
    }

    pub fn semantic_boost(&self, similarity: f64) -> f64 {
        self.weights
            .semantic_tiers
            .iter()
            .find(|(threshold, _)| similarity > *threshold)
            .map(|(_, points)| *points)
            .unwrap_or(0.0)
    }

    pub fn domain_boost(&self, record: &IndexRecord) -> f64 {
        match self.domain {
            Some(t) if t == record.object_type => self.weights.domain_boost,
            _ => 0.0,
        }
    }

    pub fn software_boost(&self, record: &IndexRecord) -> f64 {
        if !self.software_query {
            return 0.0;
        }
        let content = format!(
            "{} {}",
            record.title,
            record.description.as_deref().unwrap_or("")
        )
        .to_lowercase();
        if SOFTWARE_CONTENT_TERMS.iter().any(|t| content.contains(t)) {
            self.weights.software_boost
        } else {
            0.0
        }
    }

    /// Full breakdown for `record` given its semantic similarity (0 when absent).
    pub fn score(&self, record: &IndexRecord, similarity: f64) -> Scores {
        let keyword = self.keyword_score(record);
        let hybrid = if similarity > 0.0 {
            let w = self.weights;
            (w.keyword_weight * keyword / w.keyword_scale + w.semantic_weight * similarity)
                * w.keyword_scale
                + self.semantic_boost(similarity)
                + self.domain_boost(record)
                + self.software_boost(record)
        } else {
            keyword
        };
        Scores {
            keyword,
            semantic: similarity,
            hybrid,
        }
    }
}

/// Exact / prefix / substring tiers; the highest matching tier wins.
fn tiered(field: &str, query: &str, exact: f64, prefix: f64, contains: f64) -> f64 {
    if field == query {
        exact
    } else if field.starts_with(query) {
        prefix
    } else if field.contains(query) {
        contains
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;
    use chrono::Duration;

    fn stale(object_type: ObjectType, id: &str, title: &str, now: DateTime<Utc>) -> IndexRecord {
        let mut r = record(object_type, id, title);
        r.updated_at = now - Duration::days(30);
        r
    }

    #[test]
    fn test_reference_tiers() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let mut r = stale(ObjectType::Purchase, "PR-2024-001", "Laptops", now);
        r.reference_no = Some("PR-2024-001".to_string());

        assert_eq!(Scorer::new("pr-2024-001", &w, now).keyword_score(&r), 1050.0);
        assert_eq!(Scorer::new("pr-2024", &w, now).keyword_score(&r), 800.0);
        assert_eq!(Scorer::new("2024-001", &w, now).keyword_score(&r), 500.0);
    }

    #[test]
    fn test_title_and_status_tiers() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let mut r = stale(ObjectType::Crm, "c1", "Acme Corp", now);
        r.status = Some("Active".to_string());

        assert_eq!(Scorer::new("acme corp", &w, now).keyword_score(&r), 400.0);
        assert_eq!(Scorer::new("acme", &w, now).keyword_score(&r), 200.0);
        assert_eq!(Scorer::new("corp", &w, now).keyword_score(&r), 100.0);
        assert_eq!(Scorer::new("active", &w, now).keyword_score(&r), 300.0);
        assert_eq!(Scorer::new("activ", &w, now).keyword_score(&r), 150.0);
    }

    #[test]
    fn test_recency_bonus_is_fractional_and_floored() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let mut r = record(ObjectType::Crm, "c1", "Zeta");
        r.updated_at = now - Duration::hours(36);
        let score = Scorer::new("nomatch", &w, now).keyword_score(&r);
        assert!((score - 8.5).abs() < 1e-6);

        r.updated_at = now - Duration::days(11);
        assert_eq!(Scorer::new("nomatch", &w, now).keyword_score(&r), 0.0);
    }

    #[test]
    fn test_semantic_boost_thresholds_are_strict() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let s = Scorer::new("x", &w, now);
        assert_eq!(s.semantic_boost(0.71), 500.0);
        assert_eq!(s.semantic_boost(0.7), 200.0);
        assert_eq!(s.semantic_boost(0.5), 100.0);
        assert_eq!(s.semantic_boost(0.3), 0.0);
    }

    #[test]
    fn test_hybrid_without_semantic_equals_keyword() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let r = stale(ObjectType::Purchase, "1", "Office chairs", now);
        let scores = Scorer::new("pembelian", &w, now).score(&r, 0.0);
        assert_eq!(scores.hybrid, scores.keyword);
        assert_eq!(scores.semantic, 0.0);
    }

    #[test]
    fn test_hybrid_fusion_with_domain_boost() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let purchase = stale(ObjectType::Purchase, "1", "Office chairs", now);
        let customer = stale(ObjectType::Crm, "2", "Office Depot", now);
        let s = Scorer::new("pembelian", &w, now);

        let p = s.score(&purchase, 0.4);
        assert!((p.hybrid - (0.9 * 0.4 * 1000.0 + 100.0 + 1000.0)).abs() < 1e-6);
        let c = s.score(&customer, 0.4);
        assert!((c.hybrid - (0.9 * 0.4 * 1000.0 + 100.0)).abs() < 1e-6);
    }

    #[test]
    fn test_domain_term_must_match_whole_query() {
        assert_eq!(domain_for_query("klien"), Some(ObjectType::Crm));
        assert_eq!(domain_for_query("proyek"), Some(ObjectType::Pmo));
        assert_eq!(domain_for_query("proyek baru"), None);
    }

    #[test]
    fn test_software_boost() {
        let now = Utc::now();
        let w = ScoringWeights::default();
        let mut r = stale(ObjectType::Purchase, "1", "Adobe licenses", now);
        r.description = Some("Purchase for IT".to_string());
        let s = Scorer::new("aplikasi", &w, now);
        assert_eq!(s.software_boost(&r), 800.0);

        let plain = stale(ObjectType::Purchase, "2", "Office chairs", now);
        assert_eq!(s.software_boost(&plain), 0.0);
        assert_eq!(Scorer::new("chairs", &w, now).software_boost(&r), 0.0);
    }

    #[test]
    fn test_weights_deserialize_partial_table() {
        let w: ScoringWeights =
            serde_json::from_value(serde_json::json!({"domain_boost": 250.0})).unwrap();
        assert_eq!(w.domain_boost, 250.0);
        assert_eq!(w.reference_exact, 1000.0);
        assert_eq!(w.semantic_tiers.len(), 3);
    }
}
