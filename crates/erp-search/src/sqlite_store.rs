//! SQLite-backed [`IndexStore`] implementation.
//!
//! Keyword retrieval is an `instr` scan over the `search_fold` column, which
//! holds the Unicode lower-cased searchable fields written at upsert time,
//! with filters pushed into the `WHERE` clause. Vector retrieval
//! loads every embedding BLOB of the query's dimensionality and ranks by
//! cosine similarity in Rust. All SQL uses bound parameters.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use erp_search_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use erp_search_core::models::{FacetCount, IndexRecord, ObjectType};
use erp_search_core::store::{
    keyword_fold, FacetField, IndexStore, KeywordQuery, SemanticMatch,
};

const COLUMNS: &str = "id, object_type, object_id, reference_no, title, subtitle, description, \
     status, owner_id, owner_name, department, amount, currency, date_primary, date_secondary, \
     tags_json, search_text, embedding, content_hash, updated_at";

/// SQLite implementation of [`IndexStore`] over the `search_index` table.
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn row_to_record(row: &SqliteRow) -> Result<IndexRecord> {
    let object_type: String = row.try_get("object_type")?;
    let tags_json: String = row.try_get("tags_json")?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let date_primary: Option<i64> = row.try_get("date_primary")?;
    let date_secondary: Option<i64> = row.try_get("date_secondary")?;
    let updated_at: i64 = row.try_get("updated_at")?;

    Ok(IndexRecord {
        id: row.try_get("id")?,
        object_type: object_type.parse::<ObjectType>()?,
        object_id: row.try_get("object_id")?,
        reference_no: row.try_get("reference_no")?,
        title: row.try_get("title")?,
        subtitle: row.try_get("subtitle")?,
        description: row.try_get("description")?,
        status: row.try_get("status")?,
        owner_id: row.try_get("owner_id")?,
        owner_name: row.try_get("owner_name")?,
        department: row.try_get("department")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        date_primary: date_primary.and_then(from_millis),
        date_secondary: date_secondary.and_then(from_millis),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        search_text: row.try_get("search_text")?,
        embedding: embedding
            .filter(|b| !b.is_empty())
            .map(|b| blob_to_vec(&b)),
        content_hash: row.try_get("content_hash")?,
        updated_at: from_millis(updated_at).unwrap_or_default(),
    })
}

fn rows_to_records(rows: &[SqliteRow]) -> Result<Vec<IndexRecord>> {
    rows.iter().map(row_to_record).collect()
}

/// Recompute `search_fold` for every row. Returns the number of rows updated.
pub(crate) async fn refresh_search_fold(pool: &SqlitePool) -> Result<u64> {
    let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM search_index"))
        .fetch_all(pool)
        .await?;
    let mut updated = 0u64;
    for record in rows_to_records(&rows)? {
        updated += sqlx::query("UPDATE search_index SET search_fold = ? WHERE id = ?")
            .bind(keyword_fold(&record))
            .bind(&record.id)
            .execute(pool)
            .await?
            .rows_affected();
    }
    Ok(updated)
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_index")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert(&self, record: &IndexRecord) -> Result<()> {
        let tags_json = serde_json::to_string(&record.tags)?;
        let search_fold = keyword_fold(record);
        let embedding = record.embedding.as_deref().map(vec_to_blob);

        sqlx::query(
            r#"
            INSERT INTO search_index (id, object_type, object_id, reference_no, title, subtitle,
                                      description, status, owner_id, owner_name, department,
                                      amount, currency, date_primary, date_secondary, tags_json,
                                      search_text, search_fold, embedding, content_hash,
                                      updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                object_type = excluded.object_type,
                object_id = excluded.object_id,
                reference_no = excluded.reference_no,
                title = excluded.title,
                subtitle = excluded.subtitle,
                description = excluded.description,
                status = excluded.status,
                owner_id = excluded.owner_id,
                owner_name = excluded.owner_name,
                department = excluded.department,
                amount = excluded.amount,
                currency = excluded.currency,
                date_primary = excluded.date_primary,
                date_secondary = excluded.date_secondary,
                tags_json = excluded.tags_json,
                search_text = excluded.search_text,
                search_fold = excluded.search_fold,
                embedding = excluded.embedding,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(record.object_type.as_str())
        .bind(&record.object_id)
        .bind(&record.reference_no)
        .bind(&record.title)
        .bind(&record.subtitle)
        .bind(&record.description)
        .bind(&record.status)
        .bind(&record.owner_id)
        .bind(&record.owner_name)
        .bind(&record.department)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.date_primary.map(to_millis))
        .bind(record.date_secondary.map(to_millis))
        .bind(&tags_json)
        .bind(&record.search_text)
        .bind(&search_fold)
        .bind(embedding)
        .bind(&record.content_hash)
        .bind(to_millis(record.updated_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert index record {}", record.id))?;

        Ok(())
    }

    async fn remove(&self, object_type: ObjectType, object_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_index WHERE object_type = ? AND object_id = ?")
            .bind(object_type.as_str())
            .bind(object_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_by_object(
        &self,
        object_type: ObjectType,
        object_id: &str,
    ) -> Result<Option<IndexRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM search_index WHERE object_type = ? AND object_id = ? LIMIT 1"
        ))
        .bind(object_type.as_str())
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<IndexRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM search_index WHERE id IN ("));
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(") ORDER BY updated_at DESC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows_to_records(&rows)
    }

    async fn set_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        sqlx::query("UPDATE search_index SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn missing_embeddings(&self, limit: Option<usize>) -> Result<Vec<IndexRecord>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM search_index \
             WHERE embedding IS NULL OR length(embedding) = 0 \
             ORDER BY updated_at ASC, id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows_to_records(&rows)
    }

    async fn keyword_search(&self, query: &KeywordQuery<'_>) -> Result<Vec<IndexRecord>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM search_index WHERE 1 = 1"));

        if let Some(text) = query.text {
            qb.push(" AND instr(search_fold, ")
                .push_bind(text.to_string())
                .push(") > 0");
        }

        let filters = query.filters;
        if !filters.object_type.is_empty() {
            qb.push(" AND object_type IN (");
            let mut sep = qb.separated(", ");
            for t in &filters.object_type {
                sep.push_bind(t.as_str());
            }
            sep.push_unseparated(")");
        }
        if !filters.status.is_empty() {
            qb.push(" AND status IN (");
            let mut sep = qb.separated(", ");
            for s in &filters.status {
                sep.push_bind(s.clone());
            }
            sep.push_unseparated(")");
        }
        if let Some(owner) = &filters.owner_id {
            qb.push(" AND owner_id = ").push_bind(owner.clone());
        }
        if let Some(dept) = &filters.department {
            qb.push(" AND department = ").push_bind(dept.clone());
        }
        if let Some(from) = query.date_from {
            qb.push(" AND date_primary >= ").push_bind(to_millis(from));
        }

        qb.push(" ORDER BY updated_at DESC, id ASC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows_to_records(&rows)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<SemanticMatch>> {
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, embedding FROM search_index \
             WHERE embedding IS NOT NULL AND length(embedding) = ?",
        )
        .bind((query_vec.len() * 4) as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let vector = blob_to_vec(&blob);
            matches.push(SemanticMatch {
                id: row.try_get("id")?,
                similarity: cosine_similarity(query_vec, &vector),
            });
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn count_embedded(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM search_index WHERE embedding IS NOT NULL AND length(embedding) > 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(n as u64)
    }

    async fn facet_counts(&self, field: FacetField) -> Result<Vec<FacetCount>> {
        let col = field.column();
        let rows = sqlx::query(&format!(
            "SELECT {col} AS value, COUNT(*) AS count FROM search_index \
             WHERE {col} IS NOT NULL GROUP BY {col} ORDER BY count DESC, value ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FacetCount> {
                let count: i64 = row.try_get("count")?;
                Ok(FacetCount {
                    value: row.try_get("value")?,
                    count: count as usize,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use erp_search_core::models::{DateRange, SearchFilters};
    use erp_search_core::store::memory::InMemoryStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteIndexStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteIndexStore::new(pool)
    }

    fn record(object_type: ObjectType, object_id: &str, title: &str) -> IndexRecord {
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

    #[tokio::test]
    async fn test_upsert_and_read_back() {
        let store = memory_store().await;
        let mut r = record(ObjectType::Purchase, "PR-1", "Standing desks");
        r.tags = vec!["furniture".to_string()];
        r.amount = Some(12_000_000.0);
        r.date_primary = Some(Utc::now() - Duration::days(3));
        r.embedding = Some(vec![0.25, -0.5, 1.0]);
        r.content_hash = Some("abc".to_string());
        store.upsert(&r).await.unwrap();

        let got = store
            .get_by_object(ObjectType::Purchase, "PR-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, "Purchase-PR-1");
        assert_eq!(got.tags, r.tags);
        assert_eq!(got.amount, r.amount);
        assert_eq!(got.embedding, r.embedding);
        assert_eq!(got.content_hash.as_deref(), Some("abc"));
        assert_eq!(
            got.updated_at.timestamp_millis(),
            r.updated_at.timestamp_millis()
        );

        r.title = "Standing desks (20)".to_string();
        store.upsert(&r).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keyword_search_with_filters() {
        let store = memory_store().await;
        let now = Utc::now();
        let mut a = record(ObjectType::Purchase, "PR-1", "Laptops for IT");
        a.status = Some("Pending".to_string());
        a.department = Some("IT".to_string());
        a.date_primary = Some(now - Duration::days(2));
        let mut b = record(ObjectType::Crm, "c1", "Laptop World");
        b.status = Some("active".to_string());
        b.date_primary = Some(now - Duration::days(40));
        let mut c = record(ObjectType::Pmo, "P1", "Bridge");
        c.owner_name = Some("Laptop Larry".to_string());
        for r in [&a, &b, &c] {
            store.upsert(r).await.unwrap();
        }

        let all = SearchFilters::default();
        let hits = store
            .keyword_search(&KeywordQuery {
                text: Some("laptop"),
                filters: &all,
                date_from: None,
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);

        let filters = SearchFilters {
            object_type: vec![ObjectType::Purchase, ObjectType::Crm],
            date_range: Some(DateRange::Days30),
            ..Default::default()
        };
        let hits = store
            .keyword_search(&KeywordQuery {
                text: Some("laptop"),
                filters: &filters,
                date_from: Some(DateRange::Days30.cutoff(now)),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object_id, "PR-1");

        let filters = SearchFilters {
            department: Some("IT".to_string()),
            status: vec!["Pending".to_string()],
            ..Default::default()
        };
        let hits = store
            .keyword_search(&KeywordQuery {
                text: None,
                filters: &filters,
                date_from: None,
                limit: Some(10),
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_and_missing_embeddings() {
        let store = memory_store().await;
        let mut a = record(ObjectType::Crm, "a", "A");
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = record(ObjectType::Crm, "b", "B");
        b.embedding = Some(vec![0.0, 1.0, 0.0]);
        let c = record(ObjectType::Crm, "c", "C");
        for r in [&a, &b, &c] {
            store.upsert(r).await.unwrap();
        }

        let hits = store.vector_search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "CRM-a");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);

        let missing = store.missing_embeddings(None).await.unwrap();
        assert_eq!(missing.len(), 1);
        store.set_embedding("CRM-c", &[0.5, 0.5]).await.unwrap();
        assert_eq!(store.count_embedded().await.unwrap(), 3);
        assert!(store.missing_embeddings(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_many_orders_newest_first() {
        let store = memory_store().await;
        let now = Utc::now();
        let mut a = record(ObjectType::Crm, "a", "A");
        a.updated_at = now - Duration::days(1);
        let mut b = record(ObjectType::Crm, "b", "B");
        b.updated_at = now;
        store.upsert(&a).await.unwrap();
        store.upsert(&b).await.unwrap();

        let ids = vec![
            "CRM-a".to_string(),
            "CRM-b".to_string(),
            "CRM-missing".to_string(),
        ];
        let got = store.get_many(&ids).await.unwrap();
        let order: Vec<&str> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["CRM-b", "CRM-a"]);
        assert!(store.get_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_facets_remove_and_clear() {
        let store = memory_store().await;
        let mut a = record(ObjectType::Crm, "a", "A");
        a.owner_name = Some("Sarah".to_string());
        let mut b = record(ObjectType::Pmo, "b", "B");
        b.owner_name = Some("Sarah".to_string());
        let c = record(ObjectType::Pmo, "c", "C");
        for r in [&a, &b, &c] {
            store.upsert(r).await.unwrap();
        }

        let owners = store.facet_counts(FacetField::OwnerName).await.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].count, 2);
        let types = store.facet_counts(FacetField::ObjectType).await.unwrap();
        assert_eq!(types[0].value, "PMO");

        assert_eq!(store.remove(ObjectType::Pmo, "b").await.unwrap(), 1);
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    async fn keyword_ids<S: IndexStore + ?Sized>(
        store: &S,
        text: Option<&str>,
        filters: &SearchFilters,
    ) -> Vec<String> {
        store
            .keyword_search(&KeywordQuery {
                text,
                filters,
                date_from: None,
                limit: None,
            })
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    /// Keyword behaviour every `IndexStore` must share: Unicode case
    /// folding, OR across the seven searchable fields, filters, and
    /// newest-first ordering.
    async fn check_keyword_contract<S: IndexStore + ?Sized>(store: &S) {
        let now = Utc::now();
        let mut rows = Vec::new();

        let mut r = record(ObjectType::Crm, "cust:1", "ÖZTÜRK Trading");
        r.search_text = "ÖZTÜRK Trading".to_string();
        r.status = Some("active".to_string());
        rows.push(r);

        let mut r = record(ObjectType::Crm, "cust:2", "Acme");
        r.reference_no = Some("REF-ÉLITE".to_string());
        rows.push(r);

        let mut r = record(ObjectType::Pmo, "P-1", "Harbour");
        r.subtitle = Some("Straße Works".to_string());
        rows.push(r);

        let mut r = record(ObjectType::Pmo, "P-2", "Depot");
        r.description = Some("Marker QUARRY".to_string());
        rows.push(r);

        let mut r = record(ObjectType::Training, "T-1", "Onboarding");
        r.search_text = "onboarding quarry safety".to_string();
        rows.push(r);

        let mut r = record(ObjectType::Purchase, "PR-1", "Gloves");
        r.owner_name = Some("Quarry Team".to_string());
        r.status = Some("Pending".to_string());
        rows.push(r);

        let mut r = record(ObjectType::Purchase, "PR-2", "Helmets");
        r.status = Some("QUARRY-HOLD".to_string());
        rows.push(r);

        let mut r = record(ObjectType::Purchase, "PR-3", "Quarry Map");
        r.status = Some("Pending".to_string());
        rows.push(r);

        for (i, r) in rows.iter_mut().enumerate() {
            r.updated_at = now - Duration::minutes(i as i64);
            store.upsert(r).await.unwrap();
        }

        let all = SearchFilters::default();
        assert_eq!(
            keyword_ids(store, Some("öztürk"), &all).await,
            vec!["CRM-cust:1"]
        );
        assert_eq!(
            keyword_ids(store, Some("élite"), &all).await,
            vec!["CRM-cust:2"]
        );
        assert_eq!(
            keyword_ids(store, Some("straße"), &all).await,
            vec!["PMO-P-1"]
        );

        // description, searchText, ownerName, status and title, newest first
        assert_eq!(
            keyword_ids(store, Some("quarry"), &all).await,
            vec![
                "PMO-P-2",
                "Training-T-1",
                "Purchase-PR-1",
                "Purchase-PR-2",
                "Purchase-PR-3",
            ]
        );

        let pending = SearchFilters {
            object_type: vec![ObjectType::Purchase],
            status: vec!["Pending".to_string()],
            ..Default::default()
        };
        assert_eq!(
            keyword_ids(store, Some("quarry"), &pending).await,
            vec!["Purchase-PR-1", "Purchase-PR-3"]
        );
        assert_eq!(keyword_ids(store, None, &pending).await.len(), 2);
        assert!(keyword_ids(store, Some("bridgetower"), &all).await.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_contract_sqlite() {
        let store = memory_store().await;
        check_keyword_contract(&store).await;
    }

    #[tokio::test]
    async fn test_keyword_contract_in_memory() {
        let store = InMemoryStore::new();
        check_keyword_contract(&store).await;
    }

    #[tokio::test]
    async fn test_upsert_refreshes_fold() {
        let store = memory_store().await;
        let mut r = record(ObjectType::Crm, "cust:9", "ÉCOLE Partners");
        store.upsert(&r).await.unwrap();
        r.title = "Nordic Partners".to_string();
        r.search_text = r.title.clone();
        store.upsert(&r).await.unwrap();

        let all = SearchFilters::default();
        assert!(keyword_ids(&store, Some("école"), &all).await.is_empty());
        assert_eq!(
            keyword_ids(&store, Some("nordic"), &all).await,
            vec!["CRM-cust:9"]
        );
    }
}
