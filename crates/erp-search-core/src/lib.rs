//! # ERP Search Core
//!
//! Runtime-agnostic logic for ERP Super Search: the index data model, the
//! store abstraction, the embedding provider trait, projection of source
//! records, hybrid ranking and facet aggregation.
//!
//! This crate contains no tokio runtime, sqlx, or network I/O. Callers
//! inject an [`store::IndexStore`] and an optional
//! [`embedding::EmbeddingProvider`].
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `IndexRecord`, filters, facets, response shape |
//! | [`embedding`] | Provider trait, degrading adapters, cosine similarity |
//! | [`store`] | `IndexStore` trait and in-memory implementation |
//! | [`projection`] | Source records → index records, rebuild/update/remove |
//! | [`scoring`] | Keyword, semantic and boost scoring |
//! | [`search`] | Hybrid retrieval, relevance filter, facets, pagination |
//! | [`facets`] | Index-wide facets and stats |

pub mod embedding;
pub mod facets;
pub mod models;
pub mod projection;
pub mod scoring;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
