//! In-memory [`IndexStore`] implementation for tests and embedded use.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`. Keyword search is
//! a linear scan with [`keyword_matches`]; vector search is brute-force
//! cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{FacetCount, IndexRecord, ObjectType};

use super::{
    keyword_matches, sort_facet_counts, FacetField, IndexStore, KeywordQuery, SemanticMatch,
};

/// In-memory index store.
pub struct InMemoryStore {
    records: RwLock<HashMap<String, IndexRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, IndexRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, IndexRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(records: &mut [IndexRecord]) {
    records.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn clear(&self) -> Result<u64> {
        let mut records = self.write()?;
        let n = records.len() as u64;
        records.clear();
        Ok(n)
    }

    async fn upsert(&self, record: &IndexRecord) -> Result<()> {
        self.write()?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, object_type: ObjectType, object_id: &str) -> Result<u64> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|_, r| !(r.object_type == object_type && r.object_id == object_id));
        Ok((before - records.len()) as u64)
    }

    async fn get_by_object(
        &self,
        object_type: ObjectType,
        object_id: &str,
    ) -> Result<Option<IndexRecord>> {
        Ok(self
            .read()?
            .values()
            .find(|r| r.object_type == object_type && r.object_id == object_id)
            .cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<IndexRecord>> {
        let records = self.read()?;
        let mut out: Vec<IndexRecord> = ids
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect();
        newest_first(&mut out);
        out.dedup_by(|a, b| a.id == b.id);
        Ok(out)
    }

    async fn set_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        if let Some(r) = self.write()?.get_mut(id) {
            r.embedding = Some(vector.to_vec());
        }
        Ok(())
    }

    async fn missing_embeddings(&self, limit: Option<usize>) -> Result<Vec<IndexRecord>> {
        let mut out: Vec<IndexRecord> = self
            .read()?
            .values()
            .filter(|r| r.embedding.as_ref().map_or(true, |v| v.is_empty()))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn keyword_search(&self, query: &KeywordQuery<'_>) -> Result<Vec<IndexRecord>> {
        let mut out: Vec<IndexRecord> = self
            .read()?
            .values()
            .filter(|r| query.filters.matches(r, query.date_from))
            .filter(|r| query.text.map_or(true, |t| keyword_matches(r, t)))
            .cloned()
            .collect();
        newest_first(&mut out);
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SemanticMatch>> {
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<SemanticMatch> = self
            .read()?
            .values()
            .filter_map(|r| {
                if !r.has_embedding(query_vec.len()) {
                    return None;
                }
                let v = r.embedding.as_ref()?;
                Some(SemanticMatch {
                    id: r.id.clone(),
                    similarity: cosine_similarity(query_vec, v),
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    async fn count_embedded(&self) -> Result<u64> {
        Ok(self
            .read()?
            .values()
            .filter(|r| r.embedding.as_ref().is_some_and(|v| !v.is_empty()))
            .count() as u64)
    }

    async fn facet_counts(&self, field: FacetField) -> Result<Vec<FacetCount>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for r in self.read()?.values() {
            if let Some(v) = field.value_of(r) {
                *counts.entry(v.to_string()).or_default() += 1;
            }
        }
        let mut out: Vec<FacetCount> = counts
            .into_iter()
            .map(|(value, count)| FacetCount { value, count })
            .collect();
        sort_facet_counts(&mut out);
        Ok(out)
    }
}
