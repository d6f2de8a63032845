//! Batch RAG chunking pipeline.
//!
//! Pulls eligible documents (active, non-empty content, not yet completed
//! in the processing ledger), cleans their markup, splits them into
//! overlapping chunks and replaces each document's chunk set. Every
//! document is tracked in `rag_processing_status`; a failure marks that
//! one document `failed` and the run continues.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use archive_core::chunk::{split, to_document_chunk};
use archive_core::models::{
    DocumentChunk, DocumentRecord, DocumentType, RagStatus, RagStatusRecord,
};
use archive_core::normalize::clean_markup;
use archive_core::store::Store;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    pub document_types: Vec<DocumentType>,
    /// Maximum documents per type per run.
    pub batch_limit: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    /// Also process documents whose ledger row is `completed`.
    pub reprocess: bool,
    /// Count what would be written without touching the store.
    pub dry_run: bool,
}

impl RagSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            document_types: config.rag.types()?,
            batch_limit: config.rag.batch_limit,
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            reprocess: false,
            dry_run: false,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RagRunSummary {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Documents whose content was empty once markup was removed.
    pub skipped: usize,
    /// Document types whose pending list could not be read.
    pub types_failed: usize,
    pub chunks_written: usize,
    pub dry_run: bool,
}

/// Build the chunk set for one document.
pub fn build_chunks(
    document_type: DocumentType,
    doc: &DocumentRecord,
    chunk_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    let cleaned = clean_markup(&doc.content);
    split(&cleaned, chunk_size, overlap)
        .iter()
        .map(|piece| {
            let metadata = serde_json::json!({
                "title": doc.title,
                "document_type": document_type.as_str(),
                "created_at": doc.created_at,
                "start": piece.start,
                "end": piece.end,
            });
            to_document_chunk(document_type, doc.id, piece, metadata)
        })
        .collect()
}

/// Run one batch over every configured document type.
pub async fn process_pending<S: Store + ?Sized>(
    store: &S,
    settings: &RagSettings,
) -> Result<RagRunSummary> {
    let mut summary = RagRunSummary {
        dry_run: settings.dry_run,
        ..RagRunSummary::default()
    };

    for &document_type in &settings.document_types {
        let docs = match store
            .rag_candidates(document_type, settings.batch_limit, settings.reprocess)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                summary.types_failed += 1;
                tracing::warn!(
                    %document_type,
                    error = %format!("{:#}", e),
                    "could not list documents for chunking, skipping type"
                );
                continue;
            }
        };

        tracing::info!(%document_type, pending = docs.len(), "rag batch");

        for doc in &docs {
            summary.processed += 1;

            if settings.dry_run {
                let chunks = build_chunks(document_type, doc, settings.chunk_size, settings.overlap);
                if chunks.is_empty() {
                    summary.skipped += 1;
                }
                summary.chunks_written += chunks.len();
                continue;
            }

            match process_document(store, document_type, doc, settings).await {
                Ok(0) => summary.skipped += 1,
                Ok(count) => {
                    summary.completed += 1;
                    summary.chunks_written += count;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        %document_type,
                        document_id = doc.id,
                        error = %e,
                        "rag processing failed"
                    );
                    let mut record = ledger_row(document_type, doc.id, RagStatus::Failed, 0);
                    record.error_message = Some(format!("{:#}", e));
                    if let Err(e) = store.set_rag_status(&record).await {
                        tracing::warn!(
                            %document_type,
                            document_id = doc.id,
                            error = %e,
                            "could not record rag failure"
                        );
                    }
                }
            }
        }
    }

    tracing::info!(
        processed = summary.processed,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        types_failed = summary.types_failed,
        chunks = summary.chunks_written,
        dry_run = summary.dry_run,
        "rag run finished"
    );
    Ok(summary)
}

/// Chunk one document and record the outcome. Returns the chunk count.
async fn process_document<S: Store + ?Sized>(
    store: &S,
    document_type: DocumentType,
    doc: &DocumentRecord,
    settings: &RagSettings,
) -> Result<usize> {
    store
        .set_rag_status(&ledger_row(document_type, doc.id, RagStatus::Processing, 0))
        .await?;

    let chunks = build_chunks(document_type, doc, settings.chunk_size, settings.overlap);
    store
        .replace_chunks(document_type, doc.id, &chunks)
        .await
        .context("Failed to write chunks")?;

    store
        .set_rag_status(&ledger_row(
            document_type,
            doc.id,
            RagStatus::Completed,
            chunks.len() as i64,
        ))
        .await?;
    Ok(chunks.len())
}

fn ledger_row(
    document_type: DocumentType,
    document_id: i64,
    status: RagStatus,
    chunk_count: i64,
) -> RagStatusRecord {
    RagStatusRecord {
        document_type,
        document_id,
        status,
        chunk_count,
        error_message: None,
        last_processed_at: Utc::now().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FlakyStore;
    use archive_core::store::memory::InMemoryStore;

    fn settings() -> RagSettings {
        RagSettings {
            document_types: vec![DocumentType::Ordinance, DocumentType::Minutes],
            batch_limit: 50,
            chunk_size: 1000,
            overlap: 200,
            reprocess: false,
            dry_run: false,
        }
    }

    fn record(id: i64, content: &str, status: &str) -> DocumentRecord {
        DocumentRecord {
            id,
            title: format!("Record {}", id),
            content: content.to_string(),
            image_path: None,
            status: status.to_string(),
            created_at: 1_700_000_000 + id,
        }
    }

    fn long_html() -> String {
        (0..50)
            .map(|i| format!("<p>{:<48}.</p>", format!("Section {:02} of the adopted ordinance", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_processes_active_documents_and_is_idempotent() {
        let store = InMemoryStore::new();
        store
            .upsert_document(DocumentType::Ordinance, &record(1, &long_html(), "Active"))
            .await
            .unwrap();
        store
            .upsert_document(DocumentType::Ordinance, &record(2, "Repealed text.", "Repealed"))
            .await
            .unwrap();
        store
            .upsert_document(DocumentType::Minutes, &record(1, "Roll call. Motion carried.", "active"))
            .await
            .unwrap();

        let summary = process_pending(&store, &settings()).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 0);

        let chunks = store.chunks_for(DocumentType::Ordinance, 1).await.unwrap();
        assert!(chunks.len() >= 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(!c.chunk_text.contains('<'));
            assert_eq!(c.metadata["document_type"], "ordinance");
            assert_eq!(c.metadata["title"], "Record 1");
        }
        let ledger = store
            .get_rag_status(DocumentType::Ordinance, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.status, RagStatus::Completed);
        assert_eq!(ledger.chunk_count, chunks.len() as i64);
        assert!(store
            .get_rag_status(DocumentType::Ordinance, 2)
            .await
            .unwrap()
            .is_none());

        let rerun = process_pending(&store, &settings()).await.unwrap();
        assert_eq!(rerun.processed, 0);

        let mut reprocess = settings();
        reprocess.reprocess = true;
        let forced = process_pending(&store, &reprocess).await.unwrap();
        assert_eq!(forced.processed, 2);
        assert_eq!(
            store.chunks_for(DocumentType::Ordinance, 1).await.unwrap(),
            chunks
        );
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = InMemoryStore::new();
        store
            .upsert_document(DocumentType::Ordinance, &record(1, &long_html(), "Active"))
            .await
            .unwrap();
        let mut s = settings();
        s.dry_run = true;
        let summary = process_pending(&store, &s).await.unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.processed, 1);
        assert!(summary.chunks_written >= 2);
        assert!(store.chunks_for(DocumentType::Ordinance, 1).await.unwrap().is_empty());
        assert!(store
            .get_rag_status(DocumentType::Ordinance, 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_markup_only_document_is_skipped() {
        let store = InMemoryStore::new();
        store
            .upsert_document(DocumentType::Ordinance, &record(1, "<p> </p><br/>", "Active"))
            .await
            .unwrap();
        let summary = process_pending(&store, &settings()).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.completed, 0);
        let ledger = store
            .get_rag_status(DocumentType::Ordinance, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.status, RagStatus::Completed);
        assert_eq!(ledger.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_document() {
        let store = FlakyStore {
            failing_id: Some(2),
            ..FlakyStore::default()
        };
        for id in 1..=3 {
            store
                .upsert_document(DocumentType::Ordinance, &record(id, "Be it ordained.", "Active"))
                .await
                .unwrap();
        }

        let summary = process_pending(&store, &settings()).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);

        let failed = store
            .get_rag_status(DocumentType::Ordinance, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, RagStatus::Failed);
        assert!(failed.error_message.unwrap().contains("disk full"));

        // Failed documents are retried on the next run.
        let retry = process_pending(&store, &settings()).await.unwrap();
        assert_eq!(retry.processed, 1);
        assert_eq!(retry.failed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_type_does_not_stop_other_types() {
        let store = FlakyStore {
            failing_type: Some(DocumentType::Ordinance),
            ..FlakyStore::default()
        };
        store
            .upsert_document(DocumentType::Ordinance, &record(1, "Be it ordained.", "Active"))
            .await
            .unwrap();
        store
            .upsert_document(DocumentType::Minutes, &record(2, "Meeting adjourned.", "Active"))
            .await
            .unwrap();

        let mut s = settings();
        s.document_types = vec![DocumentType::Ordinance, DocumentType::Minutes];
        let summary = process_pending(&store, &s).await.unwrap();
        assert_eq!(summary.types_failed, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(
            store
                .get_rag_status(DocumentType::Minutes, 2)
                .await
                .unwrap()
                .unwrap()
                .status,
            RagStatus::Completed
        );
    }
}
