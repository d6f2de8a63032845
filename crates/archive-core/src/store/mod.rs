//! Storage abstraction for the archive core.
//!
//! The [`Store`] trait lists every read and write the duplicate detectors
//! and the RAG pipeline need. Components receive a store at call time
//! instead of reaching for a global connection, so the same code runs on
//! SQLite in production and on [`memory::InMemoryStore`] in tests.
//!
//! Writes keyed by `(document_type, document_id[, index])` are upserts:
//! replaying a request never creates a second row.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    DocumentChunk, DocumentRecord, DocumentType, ImageFingerprint, ImageMatch, RagStatus,
    RagStatusRecord,
};

/// Bounds for a duplicate-candidate query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateQuery {
    pub document_type: DocumentType,
    /// Inclusive content length bounds, in characters.
    pub min_length: usize,
    pub max_length: usize,
    pub exclude_document_id: Option<i64>,
    pub limit: usize,
}

/// Row counts reported by `archive stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveStats {
    pub documents: Vec<(DocumentType, i64)>,
    pub fingerprints: Vec<(DocumentType, i64)>,
    pub chunks: i64,
    pub rag_status: Vec<(RagStatus, i64)>,
    /// Most recent `last_processed_at` in the RAG ledger.
    pub last_processed_at: Option<i64>,
}

/// Abstract storage backend for the archive core.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or update a document row |
/// | [`get_document`](Store::get_document) | Fetch one document |
/// | [`duplicate_candidates`](Store::duplicate_candidates) | Length-windowed candidate rows |
/// | [`upsert_fingerprint`](Store::upsert_fingerprint) | Store one image hash |
/// | [`fingerprints_for`](Store::fingerprints_for) | Hashes of one document |
/// | [`find_image_matches`](Store::find_image_matches) | Exact hash lookup |
/// | [`documents_without_fingerprints`](Store::documents_without_fingerprints) | Backfill work list |
/// | [`rag_candidates`](Store::rag_candidates) | Documents eligible for chunking |
/// | [`replace_chunks`](Store::replace_chunks) | Swap a document's chunk set |
/// | [`chunks_for`](Store::chunks_for) | Read a document's chunks |
/// | [`set_rag_status`](Store::set_rag_status) | Upsert a ledger row |
/// | [`get_rag_status`](Store::get_rag_status) | Read a ledger row |
/// | [`stats`](Store::stats) | Row counts |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a document. A record with `id <= 0` is inserted with
    /// a fresh id. Returns the stored id.
    async fn upsert_document(&self, doc_type: DocumentType, doc: &DocumentRecord) -> Result<i64>;

    async fn get_document(&self, doc_type: DocumentType, id: i64)
        -> Result<Option<DocumentRecord>>;

    /// Documents whose content length lies within the query bounds,
    /// newest first.
    async fn duplicate_candidates(&self, query: &CandidateQuery) -> Result<Vec<DocumentRecord>>;

    /// Insert or replace the hash at `(document_type, document_id, image_index)`.
    async fn upsert_fingerprint(&self, fp: &ImageFingerprint) -> Result<()>;

    async fn fingerprints_for(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Vec<ImageFingerprint>>;

    /// Documents of `doc_type` holding an image with exactly `hash`, one row
    /// per document, newest document first.
    async fn find_image_matches(
        &self,
        doc_type: DocumentType,
        hash: &str,
        exclude_document_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ImageMatch>>;

    /// Documents with a non-empty image field and no stored fingerprints.
    async fn documents_without_fingerprints(
        &self,
        doc_type: DocumentType,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>>;

    /// Active documents with content, newest first. Documents whose ledger
    /// row is `completed` are left out unless `include_completed` is set.
    async fn rag_candidates(
        &self,
        doc_type: DocumentType,
        limit: usize,
        include_completed: bool,
    ) -> Result<Vec<DocumentRecord>>;

    /// Atomically replace all chunks of one document.
    async fn replace_chunks(
        &self,
        doc_type: DocumentType,
        document_id: i64,
        chunks: &[DocumentChunk],
    ) -> Result<()>;

    async fn chunks_for(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Vec<DocumentChunk>>;

    async fn set_rag_status(&self, record: &RagStatusRecord) -> Result<()>;

    async fn get_rag_status(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Option<RagStatusRecord>>;

    async fn stats(&self) -> Result<ArchiveStats>;
}
