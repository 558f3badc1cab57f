//! Source tables: loading for rebuilds and seeding from JSON.
//!
//! The six source tables (`crm_customers`, `crm_opportunities`,
//! `crm_leads`, `pmo_projects`, `training_sessions`, `purchase_requests`)
//! stand in for the ERP modules. [`SqliteSources`] reads them into a
//! [`SourceBatch`] for the projection builder; [`seed_from_json`] fills them
//! from a JSON file shaped like a serialized `SourceBatch`:
//!
//! ```json
//! {
//!   "customers": [{"id": "c1", "code": "CUST-001", "name": "Acme", "industry": "Retail"}],
//!   "purchases": [{"id": "PR-1", "title": "Laptops", "department": "IT"}]
//! }
//! ```
//!
//! Seeding upserts by `id`, so re-running a seed is safe.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use erp_search_core::projection::{
    Customer, Lead, Opportunity, Project, PurchaseRequest, SourceBatch, SourceLoader,
    TrainingSession,
};

use crate::sqlite_store::{from_millis, to_millis};

/// Loads every source table from SQLite.
pub struct SqliteSources {
    pool: SqlitePool,
}

impl SqliteSources {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn opt_date(row: &SqliteRow, col: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    let ms: Option<i64> = row.try_get(col)?;
    Ok(ms.and_then(from_millis))
}

fn updated(row: &SqliteRow) -> Result<chrono::DateTime<chrono::Utc>> {
    let ms: i64 = row.try_get("updated_at")?;
    Ok(from_millis(ms).unwrap_or_default())
}

#[async_trait]
impl SourceLoader for SqliteSources {
    async fn load(&self) -> Result<SourceBatch> {
        let mut batch = SourceBatch::default();

        for row in sqlx::query("SELECT * FROM crm_customers ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            batch.customers.push(Customer {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                industry: row.try_get("industry")?,
                status: row.try_get("status")?,
                owner_name: row.try_get("owner_name")?,
                revenue: row.try_get("revenue")?,
                created_at: opt_date(&row, "created_at")?,
                last_activity: opt_date(&row, "last_activity")?,
                updated_at: updated(&row)?,
            });
        }

        for row in sqlx::query("SELECT * FROM crm_opportunities ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            batch.opportunities.push(Opportunity {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                account: row.try_get("account")?,
                stage: row.try_get("stage")?,
                owner_name: row.try_get("owner_name")?,
                amount: row.try_get("amount")?,
                close_date: opt_date(&row, "close_date")?,
                updated_at: updated(&row)?,
            });
        }

        for row in sqlx::query("SELECT * FROM crm_leads ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            batch.leads.push(Lead {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                source: row.try_get("source")?,
                interest: row.try_get("interest")?,
                status: row.try_get("status")?,
                owner_name: row.try_get("owner_name")?,
                created_at: opt_date(&row, "created_at")?,
                updated_at: updated(&row)?,
            });
        }

        for row in sqlx::query("SELECT * FROM pmo_projects ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            batch.projects.push(Project {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                manager: row.try_get("manager")?,
                project_type: row.try_get("type")?,
                status: row.try_get("status")?,
                description: row.try_get("description")?,
                client: row.try_get("client")?,
                budget: row.try_get("budget")?,
                start_date: opt_date(&row, "start_date")?,
                end_date: opt_date(&row, "end_date")?,
                updated_at: updated(&row)?,
            });
        }

        for row in sqlx::query("SELECT * FROM training_sessions ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            batch.trainings.push(TrainingSession {
                id: row.try_get("id")?,
                topic: row.try_get("topic")?,
                provider: row.try_get("provider")?,
                training_type: row.try_get("type")?,
                location: row.try_get("location")?,
                status: row.try_get("status")?,
                requester: row.try_get("requester")?,
                cost: row.try_get("cost")?,
                start_date: opt_date(&row, "start_date")?,
                end_date: opt_date(&row, "end_date")?,
                updated_at: updated(&row)?,
            });
        }

        for row in sqlx::query("SELECT * FROM purchase_requests ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            batch.purchases.push(PurchaseRequest {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                requester: row.try_get("requester")?,
                department: row.try_get("department")?,
                status: row.try_get("status")?,
                total_amount: row.try_get("total_amount")?,
                request_date: opt_date(&row, "request_date")?,
                updated_at: updated(&row)?,
            });
        }

        tracing::debug!(items = batch.len(), "loaded source tables");
        Ok(batch)
    }
}

/// Rows written per source table by [`seed_from_json`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SeedReport {
    pub customers: usize,
    pub opportunities: usize,
    pub leads: usize,
    pub projects: usize,
    pub trainings: usize,
    pub purchases: usize,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.customers
            + self.opportunities
            + self.leads
            + self.projects
            + self.trainings
            + self.purchases
    }
}

/// Read a JSON seed file and upsert its rows into the source tables.
pub async fn seed_from_json(pool: &SqlitePool, path: &Path) -> Result<SeedReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let batch: SourceBatch = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))?;
    seed_batch(pool, &batch).await
}

/// Upsert every row of `batch` into the source tables in one transaction.
pub async fn seed_batch(pool: &SqlitePool, batch: &SourceBatch) -> Result<SeedReport> {
    let mut tx = pool.begin().await?;

    for c in &batch.customers {
        sqlx::query(
            r#"
            INSERT INTO crm_customers (id, code, name, industry, status, owner_name, revenue,
                                       created_at, last_activity, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code, name = excluded.name, industry = excluded.industry,
                status = excluded.status, owner_name = excluded.owner_name,
                revenue = excluded.revenue, created_at = excluded.created_at,
                last_activity = excluded.last_activity, updated_at = excluded.updated_at
            "#,
        )
        .bind(&c.id)
        .bind(&c.code)
        .bind(&c.name)
        .bind(&c.industry)
        .bind(&c.status)
        .bind(&c.owner_name)
        .bind(c.revenue)
        .bind(c.created_at.map(to_millis))
        .bind(c.last_activity.map(to_millis))
        .bind(to_millis(c.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    for o in &batch.opportunities {
        sqlx::query(
            r#"
            INSERT INTO crm_opportunities (id, name, account, stage, owner_name, amount,
                                           close_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, account = excluded.account, stage = excluded.stage,
                owner_name = excluded.owner_name, amount = excluded.amount,
                close_date = excluded.close_date, updated_at = excluded.updated_at
            "#,
        )
        .bind(&o.id)
        .bind(&o.name)
        .bind(&o.account)
        .bind(&o.stage)
        .bind(&o.owner_name)
        .bind(o.amount)
        .bind(o.close_date.map(to_millis))
        .bind(to_millis(o.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    for l in &batch.leads {
        sqlx::query(
            r#"
            INSERT INTO crm_leads (id, code, name, source, interest, status, owner_name,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code, name = excluded.name, source = excluded.source,
                interest = excluded.interest, status = excluded.status,
                owner_name = excluded.owner_name, created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&l.id)
        .bind(&l.code)
        .bind(&l.name)
        .bind(&l.source)
        .bind(&l.interest)
        .bind(&l.status)
        .bind(&l.owner_name)
        .bind(l.created_at.map(to_millis))
        .bind(to_millis(l.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    for p in &batch.projects {
        sqlx::query(
            r#"
            INSERT INTO pmo_projects (id, name, manager, type, status, description, client,
                                      budget, start_date, end_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, manager = excluded.manager, type = excluded.type,
                status = excluded.status, description = excluded.description,
                client = excluded.client, budget = excluded.budget,
                start_date = excluded.start_date, end_date = excluded.end_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&p.id)
        .bind(&p.name)
        .bind(&p.manager)
        .bind(&p.project_type)
        .bind(&p.status)
        .bind(&p.description)
        .bind(&p.client)
        .bind(&p.budget)
        .bind(p.start_date.map(to_millis))
        .bind(p.end_date.map(to_millis))
        .bind(to_millis(p.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    for t in &batch.trainings {
        sqlx::query(
            r#"
            INSERT INTO training_sessions (id, topic, provider, type, location, status,
                                           requester, cost, start_date, end_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                topic = excluded.topic, provider = excluded.provider, type = excluded.type,
                location = excluded.location, status = excluded.status,
                requester = excluded.requester, cost = excluded.cost,
                start_date = excluded.start_date, end_date = excluded.end_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&t.id)
        .bind(&t.topic)
        .bind(&t.provider)
        .bind(&t.training_type)
        .bind(&t.location)
        .bind(&t.status)
        .bind(&t.requester)
        .bind(&t.cost)
        .bind(t.start_date.map(to_millis))
        .bind(t.end_date.map(to_millis))
        .bind(to_millis(t.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    for p in &batch.purchases {
        sqlx::query(
            r#"
            INSERT INTO purchase_requests (id, title, requester, department, status,
                                           total_amount, request_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title, requester = excluded.requester,
                department = excluded.department, status = excluded.status,
                total_amount = excluded.total_amount, request_date = excluded.request_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&p.id)
        .bind(&p.title)
        .bind(&p.requester)
        .bind(&p.department)
        .bind(&p.status)
        .bind(p.total_amount)
        .bind(p.request_date.map(to_millis))
        .bind(to_millis(p.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let report = SeedReport {
        customers: batch.customers.len(),
        opportunities: batch.opportunities.len(),
        leads: batch.leads.len(),
        projects: batch.projects.len(),
        trainings: batch.trainings.len(),
        purchases: batch.purchases.len(),
    };
    tracing::info!(rows = report.total(), "seeded source tables");
    Ok(report)
}
