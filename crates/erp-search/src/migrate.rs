//! Idempotent schema migrations.
//!
//! Creates the `search_index` table and the six source tables the
//! projection builder reads from. Every statement uses `IF NOT EXISTS`, so
//! `erp-search init` can be run repeatedly.
//!
//! Timestamps are stored as Unix milliseconds. Embeddings are little-endian
//! f32 BLOBs; tags are a JSON array. `search_fold` holds the Unicode
//! lower-cased keyword fields, since SQLite's `lower()` only folds ASCII.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::refresh_search_fold;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS search_index (
        id TEXT PRIMARY KEY,
        object_type TEXT NOT NULL,
        object_id TEXT NOT NULL,
        reference_no TEXT,
        title TEXT NOT NULL,
        subtitle TEXT,
        description TEXT,
        status TEXT,
        owner_id TEXT,
        owner_name TEXT,
        department TEXT,
        amount REAL,
        currency TEXT,
        date_primary INTEGER,
        date_secondary INTEGER,
        tags_json TEXT NOT NULL DEFAULT '[]',
        search_text TEXT NOT NULL,
        search_fold TEXT NOT NULL DEFAULT '',
        embedding BLOB,
        content_hash TEXT,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_search_index_object ON search_index(object_type, object_id)",
    "CREATE INDEX IF NOT EXISTS idx_search_index_updated_at ON search_index(updated_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_search_index_status ON search_index(status)",
    r#"
    CREATE TABLE IF NOT EXISTS crm_customers (
        id TEXT PRIMARY KEY,
        code TEXT,
        name TEXT NOT NULL,
        industry TEXT,
        status TEXT,
        owner_name TEXT,
        revenue REAL,
        created_at INTEGER,
        last_activity INTEGER,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crm_opportunities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        account TEXT,
        stage TEXT,
        owner_name TEXT,
        amount REAL,
        close_date INTEGER,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crm_leads (
        id TEXT PRIMARY KEY,
        code TEXT,
        name TEXT NOT NULL,
        source TEXT,
        interest TEXT,
        status TEXT,
        owner_name TEXT,
        created_at INTEGER,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmo_projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        manager TEXT,
        type TEXT,
        status TEXT,
        description TEXT,
        client TEXT,
        budget TEXT,
        start_date INTEGER,
        end_date INTEGER,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS training_sessions (
        id TEXT PRIMARY KEY,
        topic TEXT NOT NULL,
        provider TEXT,
        type TEXT,
        location TEXT,
        status TEXT,
        requester TEXT,
        cost TEXT,
        start_date INTEGER,
        end_date INTEGER,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchase_requests (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        requester TEXT,
        department TEXT,
        status TEXT,
        total_amount REAL,
        request_date INTEGER,
        updated_at INTEGER NOT NULL
    )
    "#,
];

/// Apply the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    add_search_fold(pool).await?;
    Ok(())
}

/// Add and fill `search_fold` on databases created before the column existed.
async fn add_search_fold(pool: &SqlitePool) -> Result<()> {
    let present: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('search_index') WHERE name = 'search_fold'",
    )
    .fetch_one(pool)
    .await?;
    if present > 0 {
        return Ok(());
    }

    sqlx::query("ALTER TABLE search_index ADD COLUMN search_fold TEXT NOT NULL DEFAULT ''")
        .execute(pool)
        .await?;
    let refreshed = refresh_search_fold(pool).await?;
    tracing::info!(refreshed, "added search_fold column");
    Ok(())
}

/// Connect to the configured database and apply the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    tracing::info!(path = %config.db.path.display(), "database schema up to date");
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply(&pool).await.unwrap();
        apply(&pool).await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_index")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_apply_adds_search_fold_to_older_index() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE search_index (
                id TEXT PRIMARY KEY, object_type TEXT NOT NULL, object_id TEXT NOT NULL,
                reference_no TEXT, title TEXT NOT NULL, subtitle TEXT, description TEXT,
                status TEXT, owner_id TEXT, owner_name TEXT, department TEXT, amount REAL,
                currency TEXT, date_primary INTEGER, date_secondary INTEGER,
                tags_json TEXT NOT NULL DEFAULT '[]', search_text TEXT NOT NULL,
                embedding BLOB, content_hash TEXT, updated_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO search_index (id, object_type, object_id, title, search_text, owner_name, updated_at)
             VALUES ('CRM-cust:7', 'CRM', 'cust:7', 'ÖZTÜRK Trading', 'ÖZTÜRK Trading', 'Élodie', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        apply(&pool).await.unwrap();

        let fold: String = sqlx::query_scalar("SELECT search_fold FROM search_index WHERE id = 'CRM-cust:7'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(fold.contains("öztürk trading"));
        assert!(fold.contains("élodie"));
    }
}
