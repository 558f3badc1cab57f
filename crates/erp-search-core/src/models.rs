//! Core data models for the search index.
//!
//! [`IndexRecord`] is the normalized, denormalized document that every
//! source module (CRM, PMO, Training, Purchase) is projected into. The
//! filter, facet and response types describe the search API surface.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The business module a record was projected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "CRM")]
    Crm,
    #[serde(rename = "PMO")]
    Pmo,
    Training,
    Purchase,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Crm => "CRM",
            ObjectType::Pmo => "PMO",
            ObjectType::Training => "Training",
            ObjectType::Purchase => "Purchase",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "crm" => Ok(ObjectType::Crm),
            "pmo" => Ok(ObjectType::Pmo),
            "training" => Ok(ObjectType::Training),
            "purchase" => Ok(ObjectType::Purchase),
            other => bail!(
                "Unknown object type: '{}'. Must be CRM, PMO, Training, or Purchase.",
                other
            ),
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// One searchable business object.
///
/// Serialized in camelCase to match the search API. The `embedding` and
/// `content_hash` fields are internal and never serialized into responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// Stable identifier, `"{objectType}-{objectId}"`.
    #[serde(default)]
    pub id: String,
    pub object_type: ObjectType,
    pub object_id: String,
    #[serde(default)]
    pub reference_no: Option<String>,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub date_primary: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_secondary: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Concatenation of salient fields used for keyword matching.
    #[serde(default)]
    pub search_text: String,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    /// SHA-256 of the embedding input text.
    #[serde(default, skip_serializing)]
    pub content_hash: Option<String>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl IndexRecord {
    /// Build the deterministic index id for a source object.
    pub fn make_id(object_type: ObjectType, object_id: &str) -> String {
        format!("{}-{}", object_type, object_id)
    }

    /// Text fed to the embedding provider: title, subtitle, description and
    /// reference number, skipping empty fields, joined by single spaces.
    pub fn embedding_text(&self) -> String {
        [
            Some(self.title.as_str()),
            self.subtitle.as_deref(),
            self.description.as_deref(),
            self.reference_no.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// True when the record carries a vector of exactly `dims` dimensions.
    pub fn has_embedding(&self, dims: usize) -> bool {
        matches!(&self.embedding, Some(v) if !v.is_empty() && v.len() == dims)
    }
}

/// Relative date window applied to `datePrimary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRange {
    #[serde(rename = "7days")]
    Days7,
    #[serde(rename = "14days")]
    Days14,
    #[serde(rename = "30days")]
    Days30,
    #[serde(rename = "90days")]
    Days90,
    #[serde(rename = "1year")]
    Year1,
    #[serde(rename = "3years")]
    Years3,
}

impl DateRange {
    /// Earliest `datePrimary` admitted by this window, relative to `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cutoff = match self {
            DateRange::Days7 => now.checked_sub_signed(Duration::days(7)),
            DateRange::Days14 => now.checked_sub_signed(Duration::days(14)),
            DateRange::Days30 => now.checked_sub_signed(Duration::days(30)),
            DateRange::Days90 => now.checked_sub_signed(Duration::days(90)),
            DateRange::Year1 => now.checked_sub_months(Months::new(12)),
            DateRange::Years3 => now.checked_sub_months(Months::new(36)),
        };
        cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for DateRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "7days" => Ok(DateRange::Days7),
            "14days" => Ok(DateRange::Days14),
            "30days" => Ok(DateRange::Days30),
            "90days" => Ok(DateRange::Days90),
            "1year" => Ok(DateRange::Year1),
            "3years" => Ok(DateRange::Years3),
            other => bail!(
                "Unknown date range: '{}'. Use 7days, 14days, 30days, 90days, 1year, or 3years.",
                other
            ),
        }
    }
}

/// Structured filters accepted by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default)]
    pub object_type: Vec<ObjectType>,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

impl SearchFilters {
    /// Whether `record` passes every filter. `date_from` is the resolved
    /// [`DateRange::cutoff`]; records without a `datePrimary` never pass it.
    pub fn matches(&self, record: &IndexRecord, date_from: Option<DateTime<Utc>>) -> bool {
        if !self.object_type.is_empty() && !self.object_type.contains(&record.object_type) {
            return false;
        }
        if !self.status.is_empty() {
            match &record.status {
                Some(s) if self.status.contains(s) => {}
                _ => return false,
            }
        }
        if let Some(owner) = &self.owner_id {
            if record.owner_id.as_ref() != Some(owner) {
                return false;
            }
        }
        if let Some(dept) = &self.department {
            if record.department.as_ref() != Some(dept) {
                return false;
            }
        }
        if let Some(from) = date_from {
            match record.date_primary {
                Some(d) if d >= from => {}
                _ => return false,
            }
        }
        true
    }
}

/// A single facet value with its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: usize,
}

/// Facets computed over a ranked result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFacets {
    pub object_type: Vec<FacetCount>,
    pub status: Vec<FacetCount>,
}

/// The search response body (minus request timing, added by the HTTP layer).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<IndexRecord>,
    pub facets: SearchFacets,
    pub total_count: usize,
    pub page: usize,
    pub size: usize,
}
