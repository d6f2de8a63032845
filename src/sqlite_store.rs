//! SQLite-backed [`Store`] implementation.
//!
//! Document tables are addressed only through [`DocumentType::table_spec`];
//! table and column names are formatted into SQL from that allowlist, and
//! every caller-supplied value is bound as a parameter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use archive_core::models::{
    DocumentChunk, DocumentRecord, DocumentType, ImageFingerprint, ImageMatch, RagStatus,
    RagStatusRecord,
};
use archive_core::store::{ArchiveStats, CandidateQuery, Store};

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `SELECT` list that maps a type's columns onto [`DocumentRecord`] names.
fn document_columns(doc_type: DocumentType, alias: &str) -> String {
    let layout = doc_type.table_spec();
    format!(
        "{a}.id AS id, {a}.{title} AS title, {a}.{content} AS content, \
         {a}.{image} AS image_path, {a}.{status} AS status, {a}.{date} AS created_at",
        a = alias,
        title = layout.title_column,
        content = layout.content_column,
        image = layout.image_column,
        status = layout.status_column,
        date = layout.date_column,
    )
}

fn document_from_row(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        image_path: row.get("image_path"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc_type: DocumentType, doc: &DocumentRecord) -> Result<i64> {
        let layout = doc_type.table_spec();

        if doc.id <= 0 {
            let sql = format!(
                "INSERT INTO {table} ({title}, {content}, {image}, {status}, {date}) \
                 VALUES (?, ?, ?, ?, ?)",
                table = layout.table,
                title = layout.title_column,
                content = layout.content_column,
                image = layout.image_column,
                status = layout.status_column,
                date = layout.date_column,
            );
            let result = sqlx::query(&sql)
                .bind(&doc.title)
                .bind(&doc.content)
                .bind(&doc.image_path)
                .bind(&doc.status)
                .bind(doc.created_at)
                .execute(&self.pool)
                .await?;
            return Ok(result.last_insert_rowid());
        }

        let sql = format!(
            r#"
            INSERT INTO {table} (id, {title}, {content}, {image}, {status}, {date})
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                {title} = excluded.{title},
                {content} = excluded.{content},
                {image} = excluded.{image},
                {status} = excluded.{status},
                {date} = excluded.{date}
            "#,
            table = layout.table,
            title = layout.title_column,
            content = layout.content_column,
            image = layout.image_column,
            status = layout.status_column,
            date = layout.date_column,
        );
        sqlx::query(&sql)
            .bind(doc.id)
            .bind(&doc.title)
            .bind(&doc.content)
            .bind(&doc.image_path)
            .bind(&doc.status)
            .bind(doc.created_at)
            .execute(&self.pool)
            .await?;
        Ok(doc.id)
    }

    async fn get_document(
        &self,
        doc_type: DocumentType,
        id: i64,
    ) -> Result<Option<DocumentRecord>> {
        let sql = format!(
            "SELECT {cols} FROM {table} d WHERE d.id = ?",
            cols = document_columns(doc_type, "d"),
            table = doc_type.table_spec().table,
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn duplicate_candidates(&self, query: &CandidateQuery) -> Result<Vec<DocumentRecord>> {
        let layout = query.document_type.table_spec();
        let sql = format!(
            r#"
            SELECT {cols} FROM {table} d
            WHERE LENGTH(d.{content}) BETWEEN ? AND ?
              AND (? IS NULL OR d.id != ?)
            ORDER BY d.{date} DESC, d.id DESC
            LIMIT ?
            "#,
            cols = document_columns(query.document_type, "d"),
            table = layout.table,
            content = layout.content_column,
            date = layout.date_column,
        );
        let rows = sqlx::query(&sql)
            .bind(query.min_length as i64)
            .bind(query.max_length as i64)
            .bind(query.exclude_document_id)
            .bind(query.exclude_document_id)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn upsert_fingerprint(&self, fp: &ImageFingerprint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO image_fingerprints
                (document_type, document_id, image_index, hash, image_path, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_type, document_id, image_index) DO UPDATE SET
                hash = excluded.hash,
                image_path = excluded.image_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(fp.document_type.as_str())
        .bind(fp.document_id)
        .bind(fp.image_index)
        .bind(&fp.hash)
        .bind(&fp.image_path)
        .bind(fp.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fingerprints_for(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Vec<ImageFingerprint>> {
        let rows = sqlx::query(
            r#"
            SELECT image_index, hash, image_path, updated_at
            FROM image_fingerprints
            WHERE document_type = ? AND document_id = ?
            ORDER BY image_index
            "#,
        )
        .bind(doc_type.as_str())
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ImageFingerprint {
                document_type: doc_type,
                document_id,
                image_index: row.get("image_index"),
                hash: row.get("hash"),
                image_path: row.get("image_path"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn find_image_matches(
        &self,
        doc_type: DocumentType,
        hash: &str,
        exclude_document_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ImageMatch>> {
        let layout = doc_type.table_spec();
        // One row per document: its lowest-indexed image carrying the hash.
        let sql = format!(
            r#"
            SELECT d.id AS document_id, d.{title} AS title, f.image_path AS image_path
            FROM image_fingerprints f
            JOIN {table} d ON d.id = f.document_id
            WHERE f.document_type = ?
              AND f.hash = ?
              AND (? IS NULL OR f.document_id != ?)
              AND f.image_index = (
                  SELECT MIN(f2.image_index) FROM image_fingerprints f2
                  WHERE f2.document_type = f.document_type
                    AND f2.document_id = f.document_id
                    AND f2.hash = f.hash
              )
            ORDER BY d.{date} DESC, d.id DESC
            LIMIT ?
            "#,
            table = layout.table,
            title = layout.title_column,
            date = layout.date_column,
        );
        let rows = sqlx::query(&sql)
            .bind(doc_type.as_str())
            .bind(hash)
            .bind(exclude_document_id)
            .bind(exclude_document_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ImageMatch {
                document_id: row.get("document_id"),
                title: row.get("title"),
                image_path: row.get("image_path"),
            })
            .collect())
    }

    async fn documents_without_fingerprints(
        &self,
        doc_type: DocumentType,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let layout = doc_type.table_spec();
        let sql = format!(
            r#"
            SELECT {cols} FROM {table} d
            WHERE d.{image} IS NOT NULL
              AND TRIM(REPLACE(d.{image}, '|', '')) != ''
              AND NOT EXISTS (
                  SELECT 1 FROM image_fingerprints f
                  WHERE f.document_type = ? AND f.document_id = d.id
              )
            ORDER BY d.{date} DESC, d.id DESC
            LIMIT ?
            "#,
            cols = document_columns(doc_type, "d"),
            table = layout.table,
            image = layout.image_column,
            date = layout.date_column,
        );
        let rows = sqlx::query(&sql)
            .bind(doc_type.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn rag_candidates(
        &self,
        doc_type: DocumentType,
        limit: usize,
        include_completed: bool,
    ) -> Result<Vec<DocumentRecord>> {
        let layout = doc_type.table_spec();
        let sql = format!(
            r#"
            SELECT {cols} FROM {table} d
            WHERE LOWER(d.{status}) = 'active'
              AND TRIM(d.{content}) != ''
              AND (? OR NOT EXISTS (
                  SELECT 1 FROM rag_processing_status r
                  WHERE r.document_type = ? AND r.document_id = d.id
                    AND r.status = 'completed'
              ))
            ORDER BY d.{date} DESC, d.id DESC
            LIMIT ?
            "#,
            cols = document_columns(doc_type, "d"),
            table = layout.table,
            status = layout.status_column,
            content = layout.content_column,
            date = layout.date_column,
        );
        let rows = sqlx::query(&sql)
            .bind(include_completed)
            .bind(doc_type.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn replace_chunks(
        &self,
        doc_type: DocumentType,
        document_id: i64,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_chunks WHERE document_type = ? AND document_id = ?")
            .bind(doc_type.as_str())
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (document_type, document_id, chunk_index, chunk_text, hash, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(document_type, document_id, chunk_index) DO UPDATE SET
                    chunk_text = excluded.chunk_text,
                    hash = excluded.hash,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(doc_type.as_str())
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.chunk_text)
            .bind(&chunk.hash)
            .bind(chunk.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_index, chunk_text, hash, metadata_json
            FROM document_chunks
            WHERE document_type = ? AND document_id = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(doc_type.as_str())
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let metadata_json: String = row.get("metadata_json");
                Ok(DocumentChunk {
                    document_type: doc_type,
                    document_id,
                    chunk_index: row.get("chunk_index"),
                    chunk_text: row.get("chunk_text"),
                    hash: row.get("hash"),
                    metadata: serde_json::from_str(&metadata_json)
                        .context("corrupt chunk metadata_json")?,
                })
            })
            .collect()
    }

    async fn set_rag_status(&self, record: &RagStatusRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rag_processing_status
                (document_type, document_id, status, chunk_count, error_message, last_processed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_type, document_id) DO UPDATE SET
                status = excluded.status,
                chunk_count = excluded.chunk_count,
                error_message = excluded.error_message,
                last_processed_at = excluded.last_processed_at
            "#,
        )
        .bind(record.document_type.as_str())
        .bind(record.document_id)
        .bind(record.status.as_str())
        .bind(record.chunk_count)
        .bind(&record.error_message)
        .bind(record.last_processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_rag_status(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Option<RagStatusRecord>> {
        let row = sqlx::query(
            r#"
            SELECT status, chunk_count, error_message, last_processed_at
            FROM rag_processing_status
            WHERE document_type = ? AND document_id = ?
            "#,
        )
        .bind(doc_type.as_str())
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.get("status");
        let status = RagStatus::parse(&status)
            .with_context(|| format!("unknown rag status in ledger: '{}'", status))?;

        Ok(Some(RagStatusRecord {
            document_type: doc_type,
            document_id,
            status,
            chunk_count: row.get("chunk_count"),
            error_message: row.get("error_message"),
            last_processed_at: row.get("last_processed_at"),
        }))
    }

    async fn stats(&self) -> Result<ArchiveStats> {
        let mut stats = ArchiveStats::default();

        for doc_type in DocumentType::ALL {
            let sql = format!("SELECT COUNT(*) FROM {}", doc_type.table_spec().table);
            let docs: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
            stats.documents.push((doc_type, docs));

            let fps: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM image_fingerprints WHERE document_type = ?")
                    .bind(doc_type.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            stats.fingerprints.push((doc_type, fps));
        }

        stats.chunks = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(&self.pool)
            .await?;

        for status in [RagStatus::Processing, RagStatus::Completed, RagStatus::Failed] {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM rag_processing_status WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            stats.rag_status.push((status, count));
        }

        stats.last_processed_at =
            sqlx::query_scalar("SELECT MAX(last_processed_at) FROM rag_processing_status")
                .fetch_one(&self.pool)
                .await?;

        Ok(stats)
    }
}
