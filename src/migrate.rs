//! Schema creation for `archive init`.
//!
//! Every statement is idempotent, so running `init` against an existing
//! database only adds what is missing.

use anyhow::Result;
use archive_core::models::DocumentType;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One table per document type, names from the allowlist
    for doc_type in DocumentType::ALL {
        let layout = doc_type.table_spec();
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {title} TEXT NOT NULL DEFAULT '',
                {content} TEXT NOT NULL DEFAULT '',
                {image} TEXT,
                {status} TEXT NOT NULL DEFAULT 'Active',
                {date} INTEGER NOT NULL
            )
            "#,
            table = layout.table,
            title = layout.title_column,
            content = layout.content_column,
            image = layout.image_column,
            status = layout.status_column,
            date = layout.date_column,
        );
        sqlx::query(&ddl).execute(pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{date} ON {table}({date} DESC)",
            table = layout.table,
            date = layout.date_column,
        );
        sqlx::query(&index).execute(pool).await?;
    }

    // Create image fingerprints table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_fingerprints (
            document_type TEXT NOT NULL,
            document_id INTEGER NOT NULL,
            image_index INTEGER NOT NULL,
            hash TEXT NOT NULL,
            image_path TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (document_type, document_id, image_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            document_type TEXT NOT NULL,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            hash TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (document_type, document_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create RAG processing ledger
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rag_processing_status (
            document_type TEXT NOT NULL,
            document_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            last_processed_at INTEGER NOT NULL,
            PRIMARY KEY (document_type, document_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_image_fingerprints_hash ON image_fingerprints(document_type, hash)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rag_status_status ON rag_processing_status(status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
