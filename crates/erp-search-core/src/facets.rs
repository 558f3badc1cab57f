//! Index-wide facet and statistics aggregation.

use anyhow::Result;
use serde::Serialize;

use crate::models::{FacetCount, ObjectType};
use crate::store::{FacetField, IndexStore};

/// Distinct-value counts over the whole index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFacets {
    pub object_type: Vec<FacetCount>,
    pub status: Vec<FacetCount>,
    pub department: Vec<FacetCount>,
    pub owner: Vec<FacetCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub object_type: String,
    pub count: usize,
}

/// Index size summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_count: u64,
    pub by_type: Vec<TypeCount>,
    /// Records carrying an embedding.
    pub embedded: u64,
}

pub async fn get_facets<S: IndexStore + ?Sized>(store: &S) -> Result<IndexFacets> {
    Ok(IndexFacets {
        object_type: store.facet_counts(FacetField::ObjectType).await?,
        status: store.facet_counts(FacetField::Status).await?,
        department: store.facet_counts(FacetField::Department).await?,
        owner: store.facet_counts(FacetField::OwnerName).await?,
    })
}

/// Totals per object type. Types with no records are omitted.
pub async fn get_stats<S: IndexStore + ?Sized>(store: &S) -> Result<IndexStats> {
    let by_type = store
        .facet_counts(FacetField::ObjectType)
        .await?
        .into_iter()
        .filter(|f| f.value.parse::<ObjectType>().is_ok())
        .map(|f| TypeCount {
            object_type: f.value,
            count: f.count,
        })
        .collect();
    Ok(IndexStats {
        total_count: store.count().await?,
        by_type,
        embedded: store.count_embedded().await?,
    })
}
