//! Index projection: source records → [`IndexRecord`]s.
//!
//! Each source module (CRM customers, opportunities and leads, PMO projects,
//! training sessions, purchase requests) has its own record shape. The
//! `project_*` functions flatten them into the common index shape with a
//! fixed field mapping, and [`ProjectionBuilder`] embeds and persists the
//! results.
//!
//! # Field Mapping
//!
//! | Source | referenceNo | title | subtitle | description | status | owner | department |
//! |--------|-------------|-------|----------|-------------|--------|-------|------------|
//! | Customer | `code` | `name` | `industry` | `Customer in {industry}` | `status` | `ownerName` | `Sales` |
//! | Opportunity | `OPP-{id[..8]}` | `name` | `account` | `Opportunity for {account}` | `stage` | `ownerName` | `Sales` |
//! | Lead | `code` or `LEAD-{id}` | `name` | `source` | `interest` | `status` | `ownerName` | `Sales` |
//! | Project | `id` | `name` | `type` | `description` | `status` | `manager` | `PMO` |
//! | Training | `TR-{id}` | `topic` | `provider` | `{type} training at {location}` | `status` | `requester` | `HR` |
//! | Purchase | `id` | `title` | `department` | `Purchase for {department}` | `status` | `requester` | `department` |
//!
//! Amounts are in IDR. Budget and cost strings are stripped of everything
//! but digits; anything unparsable becomes `0`.
//!
//! Customers, opportunities and leads share the `CRM` object type, so their
//! `objectId` carries the source kind: `cust:{id}`, `opp:{id}`, `lead:{id}`.
//! Reference numbers keep the raw source id.

use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::embedding::{content_hash, embed_batch, EmbeddingProvider};
use crate::models::{IndexRecord, ObjectType};
use crate::store::IndexStore;

const CURRENCY: &str = "IDR";
const DEFAULT_BATCH: usize = 32;

pub const CUSTOMER_PREFIX: &str = "cust:";
pub const OPPORTUNITY_PREFIX: &str = "opp:";
pub const LEAD_PREFIX: &str = "lead:";

/// A record rejected by [`ProjectionBuilder::update_item`] before it reaches
/// the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecord(pub String);

impl fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidRecord {}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
fn flexible_date<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date: '{raw}'")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub close_date: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub interest: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default, rename = "type")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    /// Free-form budget string, e.g. `"Rp 850.000.000"`.
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSession {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, rename = "type")]
    pub training_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub requester: Option<String>,
    /// Free-form cost string; `"Free"` means zero.
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub requester: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "flexible_date")]
    pub request_date: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

/// Every source collection, as loaded from the source tables or a seed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceBatch {
    pub customers: Vec<Customer>,
    pub opportunities: Vec<Opportunity>,
    pub leads: Vec<Lead>,
    pub projects: Vec<Project>,
    pub trainings: Vec<TrainingSession>,
    pub purchases: Vec<PurchaseRequest>,
}

impl SourceBatch {
    pub fn len(&self) -> usize {
        self.customers.len()
            + self.opportunities.len()
            + self.leads.len()
            + self.projects.len()
            + self.trainings.len()
            + self.purchases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Project every source item into an index record.
    pub fn project(&self) -> Vec<IndexRecord> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.projects.iter().map(project_project));
        out.extend(self.customers.iter().map(project_customer));
        out.extend(self.opportunities.iter().map(project_opportunity));
        out.extend(self.leads.iter().map(project_lead));
        out.extend(self.trainings.iter().map(project_training));
        out.extend(self.purchases.iter().map(project_purchase));
        out
    }
}

/// Anything that can produce the current source collections.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self) -> Result<SourceBatch>;
}

#[async_trait]
impl SourceLoader for SourceBatch {
    async fn load(&self) -> Result<SourceBatch> {
        Ok(self.clone())
    }
}

/// Strip everything but ASCII digits and parse. Empty or unparsable → `0`.
pub fn parse_amount(raw: &str) -> f64 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<f64>().unwrap_or(0.0)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn join_text(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tags_from(parts: &[Option<&str>]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in parts.iter().flatten().flat_map(|s| s.split_whitespace()) {
        let tag = word.to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn base(object_type: ObjectType, object_id: &str, title: &str) -> IndexRecord {
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
        currency: Some(CURRENCY.to_string()),
        date_primary: None,
        date_secondary: None,
        tags: Vec::new(),
        search_text: String::new(),
        embedding: None,
        content_hash: None,
        updated_at: Utc::now(),
    }
}

fn with_search_text(mut record: IndexRecord, text: String) -> IndexRecord {
    record.search_text = if text.is_empty() {
        record.title.clone()
    } else {
        text
    };
    record
}

pub fn project_customer(c: &Customer) -> IndexRecord {
    let industry = c.industry.as_deref();
    let mut r = base(ObjectType::Crm, &format!("{CUSTOMER_PREFIX}{}", c.id), &c.name);
    r.reference_no = non_empty(c.code.as_deref());
    r.subtitle = non_empty(industry);
    r.description = Some(format!("Customer in {}", industry.unwrap_or("")).trim().to_string());
    r.status = non_empty(c.status.as_deref());
    r.owner_name = non_empty(c.owner_name.as_deref());
    r.department = Some("Sales".to_string());
    r.amount = Some(c.revenue.unwrap_or(0.0));
    r.date_primary = c.created_at;
    r.date_secondary = c.last_activity;
    r.tags = tags_from(&[industry]);
    r.updated_at = c.updated_at;
    let text = join_text(&[
        Some(&c.name),
        c.code.as_deref(),
        industry,
        c.owner_name.as_deref(),
        c.status.as_deref(),
    ]);
    with_search_text(r, text)
}

pub fn project_opportunity(o: &Opportunity) -> IndexRecord {
    let account = o.account.as_deref();
    let prefix: String = o.id.chars().take(8).collect();
    let mut r = base(ObjectType::Crm, &format!("{OPPORTUNITY_PREFIX}{}", o.id), &o.name);
    r.reference_no = Some(format!("OPP-{prefix}"));
    r.subtitle = non_empty(account);
    r.description = Some(format!("Opportunity for {}", account.unwrap_or("")).trim().to_string());
    r.status = non_empty(o.stage.as_deref());
    r.owner_name = non_empty(o.owner_name.as_deref());
    r.department = Some("Sales".to_string());
    r.amount = Some(o.amount.unwrap_or(0.0));
    r.date_primary = o.close_date;
    r.updated_at = o.updated_at;
    let text = join_text(&[Some(&o.name), account, o.stage.as_deref()]);
    with_search_text(r, text)
}

pub fn project_lead(l: &Lead) -> IndexRecord {
    let mut r = base(ObjectType::Crm, &format!("{LEAD_PREFIX}{}", l.id), &l.name);
    r.reference_no =
        non_empty(l.code.as_deref()).or_else(|| Some(format!("LEAD-{}", l.id)));
    r.subtitle = non_empty(l.source.as_deref());
    r.description = non_empty(l.interest.as_deref());
    r.status = non_empty(l.status.as_deref());
    r.owner_name = non_empty(l.owner_name.as_deref());
    r.department = Some("Sales".to_string());
    r.date_primary = l.created_at;
    r.updated_at = l.updated_at;
    let text = join_text(&[
        Some(&l.name),
        l.source.as_deref(),
        l.interest.as_deref(),
        l.status.as_deref(),
    ]);
    with_search_text(r, text)
}

pub fn project_project(p: &Project) -> IndexRecord {
    let mut r = base(ObjectType::Pmo, &p.id, &p.name);
    r.reference_no = Some(p.id.clone());
    r.subtitle = non_empty(p.project_type.as_deref());
    r.description = non_empty(p.description.as_deref());
    r.status = non_empty(p.status.as_deref());
    r.owner_name = non_empty(p.manager.as_deref());
    r.department = Some("PMO".to_string());
    r.amount = Some(p.budget.as_deref().map(parse_amount).unwrap_or(0.0));
    r.date_primary = p.start_date;
    r.date_secondary = p.end_date;
    r.tags = tags_from(&[p.project_type.as_deref(), p.client.as_deref()]);
    r.updated_at = p.updated_at;
    let text = join_text(&[
        Some(&p.name),
        p.project_type.as_deref(),
        p.manager.as_deref(),
        p.status.as_deref(),
        p.description.as_deref(),
        p.client.as_deref(),
    ]);
    with_search_text(r, text)
}

pub fn project_training(t: &TrainingSession) -> IndexRecord {
    let mut r = base(ObjectType::Training, &t.id, &t.topic);
    r.reference_no = Some(format!("TR-{}", t.id));
    r.subtitle = non_empty(t.provider.as_deref());
    r.description = Some(
        format!(
            "{} training at {}",
            t.training_type.as_deref().unwrap_or(""),
            t.location.as_deref().unwrap_or("")
        )
        .trim()
        .to_string(),
    );
    r.status = non_empty(t.status.as_deref());
    r.owner_name = non_empty(t.requester.as_deref());
    r.department = Some("HR".to_string());
    r.amount = Some(t.cost.as_deref().map(parse_amount).unwrap_or(0.0));
    r.date_primary = t.start_date;
    r.date_secondary = t.end_date;
    r.tags = tags_from(&[t.training_type.as_deref()]);
    r.updated_at = t.updated_at;
    let text = join_text(&[
        Some(&t.topic),
        t.provider.as_deref(),
        t.training_type.as_deref(),
        t.location.as_deref(),
    ]);
    with_search_text(r, text)
}

pub fn project_purchase(p: &PurchaseRequest) -> IndexRecord {
    let department = p.department.as_deref();
    let mut r = base(ObjectType::Purchase, &p.id, &p.title);
    r.reference_no = Some(p.id.clone());
    r.subtitle = non_empty(department);
    r.description = Some(format!("Purchase for {}", department.unwrap_or("")).trim().to_string());
    r.status = non_empty(p.status.as_deref());
    r.owner_name = non_empty(p.requester.as_deref());
    r.department = non_empty(department);
    r.amount = Some(p.total_amount.unwrap_or(0.0));
    r.date_primary = p.request_date;
    r.updated_at = p.updated_at;
    let text = join_text(&[
        Some(&p.title),
        p.requester.as_deref(),
        department,
        p.status.as_deref(),
    ]);
    with_search_text(r, text)
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    /// Records written to the index.
    pub count: usize,
    pub embedded: usize,
    pub without_embedding: usize,
    /// Projected records dropped because an earlier one had the same id.
    pub duplicates: usize,
}

/// Outcome of an embedding backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub pending: usize,
    pub embedded: usize,
}

/// Builds and maintains the index from source records.
pub struct ProjectionBuilder<'a, S: IndexStore + ?Sized> {
    store: &'a S,
    provider: Option<&'a dyn EmbeddingProvider>,
}

impl<'a, S: IndexStore + ?Sized> ProjectionBuilder<'a, S> {
    pub fn new(store: &'a S, provider: Option<&'a dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    fn batch_size(&self) -> usize {
        self.provider
            .map(|p| p.batch_size().max(1))
            .unwrap_or(DEFAULT_BATCH)
    }

    /// Clear the index and re-project every source item.
    ///
    /// Sources are loaded before the index is cleared, so a failing loader
    /// leaves the previous index intact. Embedding failures never abort the
    /// rebuild; the affected records are stored without a vector.
    pub async fn rebuild_index(&self, loader: &dyn SourceLoader) -> Result<RebuildReport> {
        let sources = loader.load().await?;
        let projected = sources.project();
        let projected_len = projected.len();
        let mut seen = HashSet::with_capacity(projected_len);
        let mut records: Vec<IndexRecord> = projected
            .into_iter()
            .filter(|r| {
                let fresh = seen.insert(r.id.clone());
                if !fresh {
                    tracing::warn!(id = %r.id, "duplicate source id, keeping first occurrence");
                }
                fresh
            })
            .collect();
        let duplicates = projected_len - records.len();
        tracing::info!(items = records.len(), duplicates, "projected source records");

        let cleared = self.store.clear().await?;
        tracing::info!(cleared, "cleared search index");

        let mut embedded = 0usize;
        let batch_size = self.batch_size();
        for batch in records.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(IndexRecord::embedding_text).collect();
            let vectors = match self.provider {
                Some(p) => embed_batch(p, &texts).await,
                None => vec![Vec::new(); texts.len()],
            };
            for ((record, text), vector) in batch.iter_mut().zip(&texts).zip(vectors) {
                record.content_hash = Some(content_hash(text));
                if !vector.is_empty() {
                    record.embedding = Some(vector);
                    embedded += 1;
                }
                self.store.upsert(record).await?;
            }
            tracing::debug!(batch = batch.len(), "indexed batch");
        }

        let report = RebuildReport {
            count: records.len(),
            embedded,
            without_embedding: records.len() - embedded,
            duplicates,
        };
        tracing::info!(
            count = report.count,
            embedded = report.embedded,
            without_embedding = report.without_embedding,
            duplicates = report.duplicates,
            "search index rebuild complete"
        );
        Ok(report)
    }

    /// Upsert a single record by `(objectType, objectId)`.
    ///
    /// The id is derived from the object identity. A supplied embedding is
    /// kept only if it has the provider's dimensionality. Otherwise the
    /// stored embedding is reused when the embedding text is unchanged, and
    /// the record is re-embedded when it is not.
    ///
    /// An empty `objectId` or `title` fails with [`InvalidRecord`].
    pub async fn update_item(&self, mut record: IndexRecord) -> Result<IndexRecord> {
        if record.object_id.trim().is_empty() {
            return Err(InvalidRecord("objectId must not be empty".to_string()).into());
        }
        if record.title.trim().is_empty() {
            return Err(InvalidRecord("title must not be empty".to_string()).into());
        }
        record.id = IndexRecord::make_id(record.object_type, &record.object_id);
        if record.search_text.trim().is_empty() {
            record.search_text = record.title.clone();
        }

        let text = record.embedding_text();
        let hash = content_hash(&text);

        let dims = self.provider.map(|p| p.dims());
        if let Some(supplied) = record.embedding.take() {
            if !supplied.is_empty() && Some(supplied.len()) == dims {
                record.embedding = Some(supplied);
            } else if !supplied.is_empty() {
                tracing::warn!(
                    id = %record.id,
                    got = supplied.len(),
                    expected = ?dims,
                    "discarding supplied embedding with wrong dimensionality"
                );
            }
        }

        if record.embedding.is_none() {
            let existing = self
                .store
                .get_by_object(record.object_type, &record.object_id)
                .await?;
            let reusable = existing.and_then(|e| {
                if e.content_hash.as_deref() == Some(hash.as_str()) {
                    e.embedding
                        .filter(|v| !v.is_empty() && dims.map_or(true, |d| v.len() == d))
                } else {
                    None
                }
            });
            match reusable {
                Some(vector) => {
                    tracing::debug!(id = %record.id, "embedding text unchanged, reusing vector");
                    record.embedding = Some(vector);
                }
                None => {
                    if let Some(p) = self.provider {
                        let vector = embed_batch(p, std::slice::from_ref(&text))
                            .await
                            .into_iter()
                            .next()
                            .unwrap_or_default();
                        if !vector.is_empty() {
                            record.embedding = Some(vector);
                        }
                    }
                }
            }
        }

        record.content_hash = Some(hash);
        self.store.upsert(&record).await?;
        tracing::info!(id = %record.id, embedded = record.embedding.is_some(), "updated index item");
        Ok(record)
    }

    /// Delete the index entries for a source object. Returns the number removed.
    pub async fn remove_item(&self, object_type: ObjectType, object_id: &str) -> Result<u64> {
        let removed = self.store.remove(object_type, object_id).await?;
        tracing::info!(object_type = %object_type, object_id, removed, "removed index item");
        Ok(removed)
    }

    /// Embed records that have no vector yet.
    pub async fn backfill_embeddings(&self, limit: Option<usize>) -> Result<BackfillReport> {
        let Some(provider) = self.provider else {
            bail!("embedding provider is disabled; set [embedding] provider in config");
        };

        let pending = self.store.missing_embeddings(limit).await?;
        let mut embedded = 0usize;
        for batch in pending.chunks(self.batch_size()) {
            let texts: Vec<String> = batch.iter().map(IndexRecord::embedding_text).collect();
            let vectors = embed_batch(provider, &texts).await;
            for (record, vector) in batch.iter().zip(vectors) {
                if vector.is_empty() {
                    continue;
                }
                self.store.set_embedding(&record.id, &vector).await?;
                embedded += 1;
            }
        }

        tracing::info!(pending = pending.len(), embedded, "embedding backfill complete");
        Ok(BackfillReport {
            pending: pending.len(),
            embedded,
        })
    }
}
