//! Storage abstraction for the search index.
//!
//! The [`IndexStore`] trait defines every persistence operation the
//! projection builder, search engine and facet service need, so the core
//! logic runs unchanged against SQLite (in the app crate) or the in-memory
//! store used by tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FacetCount, IndexRecord, ObjectType, SearchFilters};

/// Keyword retrieval request.
///
/// `text` is the lower-cased, trimmed query; `None` means "no text
/// predicate" and returns every record passing the filters.
#[derive(Debug, Clone, Copy)]
pub struct KeywordQuery<'a> {
    pub text: Option<&'a str>,
    pub filters: &'a SearchFilters,
    /// Resolved lower bound for `datePrimary`, if a date range is set.
    pub date_from: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// One hit from vector retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub id: String,
    pub similarity: f32,
}

/// Index columns that can be faceted over the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetField {
    ObjectType,
    Status,
    Department,
    OwnerName,
}

impl FacetField {
    /// Column name in the `search_index` table.
    pub fn column(&self) -> &'static str {
        match self {
            FacetField::ObjectType => "object_type",
            FacetField::Status => "status",
            FacetField::Department => "department",
            FacetField::OwnerName => "owner_name",
        }
    }

    /// The value of this field on `record`, if any.
    pub fn value_of<'a>(&self, record: &'a IndexRecord) -> Option<&'a str> {
        match self {
            FacetField::ObjectType => Some(record.object_type.as_str()),
            FacetField::Status => record.status.as_deref(),
            FacetField::Department => record.department.as_deref(),
            FacetField::OwnerName => record.owner_name.as_deref(),
        }
    }
}

/// Separator between fields in [`keyword_fold`]. A needle without this
/// character cannot match across a field boundary.
pub const FOLD_SEPARATOR: char = '\u{1f}';

/// The keyword-searchable fields of `record`, in column order.
pub fn keyword_fields(record: &IndexRecord) -> [Option<&str>; 7] {
    [
        record.reference_no.as_deref(),
        Some(record.title.as_str()),
        record.subtitle.as_deref(),
        record.description.as_deref(),
        Some(record.search_text.as_str()),
        record.owner_name.as_deref(),
        record.status.as_deref(),
    ]
}

/// Case-insensitive substring match of `needle` (already lower-cased)
/// against the keyword-searchable fields of `record`.
pub fn keyword_matches(record: &IndexRecord, needle: &str) -> bool {
    keyword_fields(record)
        .into_iter()
        .flatten()
        .any(|f| f.to_lowercase().contains(needle))
}

/// Unicode-lower-cased keyword fields joined by [`FOLD_SEPARATOR`].
///
/// Stores that cannot fold case themselves persist this next to the record
/// and substring-match the lower-cased query against it. For a needle
/// without [`FOLD_SEPARATOR`] this agrees with [`keyword_matches`].
pub fn keyword_fold(record: &IndexRecord) -> String {
    let mut fold = String::new();
    for field in keyword_fields(record).into_iter().flatten() {
        if !fold.is_empty() {
            fold.push(FOLD_SEPARATOR);
        }
        fold.push_str(&field.to_lowercase());
    }
    fold
}

/// Abstract storage backend for the search index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`clear`](IndexStore::clear) | Delete every record |
/// | [`upsert`](IndexStore::upsert) | Insert or replace a record by `id` |
/// | [`remove`](IndexStore::remove) | Delete by `(objectType, objectId)` |
/// | [`get_by_object`](IndexStore::get_by_object) | Fetch one record by source identity |
/// | [`get_many`](IndexStore::get_many) | Fetch records by id, newest first |
/// | [`set_embedding`](IndexStore::set_embedding) | Attach a vector to a record |
/// | [`missing_embeddings`](IndexStore::missing_embeddings) | Records with no vector |
/// | [`keyword_search`](IndexStore::keyword_search) | Filtered substring retrieval |
/// | [`vector_search`](IndexStore::vector_search) | Brute-force cosine retrieval |
/// | [`count`](IndexStore::count) / [`count_embedded`](IndexStore::count_embedded) | Totals |
/// | [`facet_counts`](IndexStore::facet_counts) | Distinct-value counts for a column |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Delete every record. Returns the number removed.
    async fn clear(&self) -> Result<u64>;

    /// Insert or replace a record, keyed by `record.id`.
    async fn upsert(&self, record: &IndexRecord) -> Result<()>;

    /// Delete records matching `(object_type, object_id)`. Returns the number removed.
    async fn remove(&self, object_type: ObjectType, object_id: &str) -> Result<u64>;

    async fn get_by_object(
        &self,
        object_type: ObjectType,
        object_id: &str,
    ) -> Result<Option<IndexRecord>>;

    /// Load records by id, ordered by `updatedAt` descending then `id`.
    /// Unknown ids are skipped.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<IndexRecord>>;

    async fn set_embedding(&self, id: &str, vector: &[f32]) -> Result<()>;

    /// Records whose embedding is null, oldest first.
    async fn missing_embeddings(&self, limit: Option<usize>) -> Result<Vec<IndexRecord>>;

    /// Records matching the text predicate and filters, ordered by
    /// `updatedAt` descending then `id`.
    async fn keyword_search(&self, query: &KeywordQuery<'_>) -> Result<Vec<IndexRecord>>;

    /// Top `limit` records by cosine similarity to `query_vec`, descending.
    ///
    /// Only vectors with the same length as `query_vec` are compared.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SemanticMatch>>;

    async fn count(&self) -> Result<u64>;

    async fn count_embedded(&self) -> Result<u64>;

    /// Distinct non-null values of `field` with counts, sorted by count
    /// descending then value ascending.
    async fn facet_counts(&self, field: FacetField) -> Result<Vec<FacetCount>>;
}

/// Sort facet counts by count descending, then value ascending.
pub fn sort_facet_counts(counts: &mut [FacetCount]) {
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[test]
    fn test_keyword_fold_lowercases_unicode() {
        let mut r = record(ObjectType::Crm, "cust:7", "ÖZTÜRK Trading");
        r.owner_name = Some("Élodie Martin".to_string());
        r.status = Some("ACTIVE".to_string());

        let fold = keyword_fold(&r);
        assert!(fold.contains("öztürk trading"));
        assert!(fold.contains("élodie"));
        assert!(fold.contains("active"));
        assert!(keyword_matches(&r, "öztürk"));
        assert!(keyword_matches(&r, "élodie"));
    }

    #[test]
    fn test_keyword_fold_keeps_fields_apart() {
        let mut r = record(ObjectType::Pmo, "P-1", "Bridge");
        r.search_text = "Tower".to_string();
        let fold = keyword_fold(&r);
        assert_eq!(fold, format!("bridge{FOLD_SEPARATOR}tower"));
        assert!(!fold.contains("bridgetower"));
        assert!(!keyword_matches(&r, "bridgetower"));
    }
}
