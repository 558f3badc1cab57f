//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::EmbeddingProvider;
use crate::models::{IndexRecord, ObjectType};

pub fn record(object_type: ObjectType, object_id: &str, title: &str) -> IndexRecord {
    IndexRecord {
        id: IndexRecord::make_id(object_type, object_id),
        object_type,
        object_id: object_id.to_string(),
        reference_no: None,
        title: title.to_string(),
        subtitle: None,
        description: None,
        status: None,
        owner_id: None,
        owner_name: None,
        department: None,
        amount: None,
        currency: None,
        date_primary: None,
        date_secondary: None,
        tags: Vec::new(),
        search_text: title.to_string(),
        embedding: None,
        content_hash: None,
        updated_at: Utc::now(),
    }
}

/// Unit vector in 2D whose cosine with `[1, 0]` is `similarity`.
pub fn at_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt()]
}

/// Two-dimensional provider with a fixed text → vector table.
///
/// Unknown texts map to `[0, 1]`. A failing provider errors on every call.
pub struct StaticProvider {
    vectors: HashMap<String, Vec<f32>>,
    failing: bool,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StaticProvider {
    fn model_name(&self) -> &str {
        "static-test"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            bail!("embedding service unreachable");
        }
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0, 1.0])
            })
            .collect())
    }
}
