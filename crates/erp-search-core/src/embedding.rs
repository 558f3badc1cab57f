//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that embedding backends
//! implement, the degrading [`embed`] / [`embed_batch`] adapters used by the
//! projection builder and search engine, and pure helpers for vector
//! serialization, similarity and content hashing.
//!
//! Concrete providers (the HTTP embedding service) live in the `erp-search`
//! app crate.
//!
//! # Failure Semantics
//!
//! Providers report transport and protocol errors through `Result`. The
//! adapters swallow them: a failed input maps to an empty vector, which every
//! caller treats as "no semantic signal". A vector whose length differs from
//! [`EmbeddingProvider::dims`] is treated the same way.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Number of texts sent per provider call.
    fn batch_size(&self) -> usize {
        32
    }
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text. Returns an empty vector on any failure.
pub async fn embed(provider: &dyn EmbeddingProvider, text: &str) -> Vec<f32> {
    embed_batch(provider, &[text.to_string()])
        .await
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// Embed many texts in provider-sized batches.
///
/// The output always has one entry per input. Entries belonging to a failed
/// batch, or whose dimensionality is wrong, are empty vectors.
pub async fn embed_batch(provider: &dyn EmbeddingProvider, texts: &[String]) -> Vec<Vec<f32>> {
    let dims = provider.dims();
    let batch_size = provider.batch_size().max(1);
    let mut out = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        match provider.embed_texts(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for v in vectors {
                    if v.len() == dims {
                        out.push(v);
                    } else {
                        tracing::warn!(
                            expected = dims,
                            got = v.len(),
                            "embedding has wrong dimensionality, ignoring"
                        );
                        out.push(Vec::new());
                    }
                }
            }
            Ok(vectors) => {
                tracing::warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "embedding provider returned wrong number of vectors"
                );
                out.extend(std::iter::repeat_with(Vec::new).take(batch.len()));
            }
            Err(e) => {
                tracing::warn!(
                    model = provider.model_name(),
                    batch = batch.len(),
                    error = %e,
                    "embedding batch failed"
                );
                out.extend(std::iter::repeat_with(Vec::new).take(batch.len()));
            }
        }
    }

    out
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial values are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` when either vector is empty,
/// the lengths differ, or either vector has zero norm.
///
/// ```rust
/// use erp_search_core::embedding::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
/// assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        dims: usize,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        fn batch_size(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                bail!("provider unavailable");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    if t == "short" {
                        vec![1.0]
                    } else {
                        vec![t.len() as f32; self.dims]
                    }
                })
                .collect())
        }
    }

    fn provider(fail_on_call: Option<usize>) -> FixedProvider {
        FixedProvider {
            dims: 3,
            calls: AtomicUsize::new(0),
            fail_on_call,
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_blob_to_vec_ignores_partial_tail() {
        let mut blob = vec_to_blob(&[1.0, 2.0]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![1.0, 2.0]);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = [0.3, -1.2, 4.0];
        let b = [2.0, 0.5, -0.7];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let h = content_hash("Acme Corp");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("Acme Corp"));
        assert_ne!(h, content_hash("Acme Corp."));
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order_and_count() {
        let p = provider(None);
        let texts: Vec<String> = ["a", "bb", "ccc"].iter().map(|s| s.to_string()).collect();
        let out = embed_batch(&p, &texts).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], vec![1.0; 3]);
        assert_eq!(out[2], vec![3.0; 3]);
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embed_batch_degrades_failed_batch_only() {
        let p = provider(Some(1));
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = embed_batch(&p, &texts).await;
        assert_eq!(out.len(), 4);
        assert!(!out[0].is_empty());
        assert!(!out[1].is_empty());
        assert!(out[2].is_empty());
        assert!(out[3].is_empty());
    }

    #[tokio::test]
    async fn test_embed_drops_wrong_dimensionality() {
        let p = provider(None);
        assert!(embed(&p, "short").await.is_empty());
        assert_eq!(embed(&p, "ok").await.len(), 3);
    }

    #[tokio::test]
    async fn test_embed_failure_returns_empty() {
        let p = provider(Some(0));
        assert!(embed(&p, "anything").await.is_empty());
    }
}
