//! Store wrappers shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;

use archive_core::models::{
    DocumentChunk, DocumentRecord, DocumentType, ImageFingerprint, ImageMatch, RagStatusRecord,
};
use archive_core::store::memory::InMemoryStore;
use archive_core::store::{ArchiveStats, CandidateQuery, Store};

/// Delegates to an in-memory store but fails writes for one document id and
/// listings for one document type.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    /// Chunk and fingerprint writes for this id fail.
    pub failing_id: Option<i64>,
    /// Work-list queries for this type fail.
    pub failing_type: Option<DocumentType>,
}

impl FlakyStore {
    fn check_id(&self, id: i64) -> Result<()> {
        if self.failing_id == Some(id) {
            anyhow::bail!("disk full");
        }
        Ok(())
    }

    fn check_type(&self, doc_type: DocumentType) -> Result<()> {
        if self.failing_type == Some(doc_type) {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn upsert_document(&self, t: DocumentType, d: &DocumentRecord) -> Result<i64> {
        self.inner.upsert_document(t, d).await
    }
    async fn get_document(&self, t: DocumentType, id: i64) -> Result<Option<DocumentRecord>> {
        self.inner.get_document(t, id).await
    }
    async fn duplicate_candidates(&self, q: &CandidateQuery) -> Result<Vec<DocumentRecord>> {
        self.inner.duplicate_candidates(q).await
    }
    async fn upsert_fingerprint(&self, fp: &ImageFingerprint) -> Result<()> {
        self.check_id(fp.document_id)?;
        self.inner.upsert_fingerprint(fp).await
    }
    async fn fingerprints_for(&self, t: DocumentType, id: i64) -> Result<Vec<ImageFingerprint>> {
        self.inner.fingerprints_for(t, id).await
    }
    async fn find_image_matches(
        &self,
        t: DocumentType,
        hash: &str,
        exclude: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ImageMatch>> {
        self.inner.find_image_matches(t, hash, exclude, limit).await
    }
    async fn documents_without_fingerprints(
        &self,
        t: DocumentType,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        self.check_type(t)?;
        self.inner.documents_without_fingerprints(t, limit).await
    }
    async fn rag_candidates(
        &self,
        t: DocumentType,
        limit: usize,
        include_completed: bool,
    ) -> Result<Vec<DocumentRecord>> {
        self.check_type(t)?;
        self.inner.rag_candidates(t, limit, include_completed).await
    }
    async fn replace_chunks(
        &self,
        t: DocumentType,
        id: i64,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        self.check_id(id)?;
        self.inner.replace_chunks(t, id, chunks).await
    }
    async fn chunks_for(&self, t: DocumentType, id: i64) -> Result<Vec<DocumentChunk>> {
        self.inner.chunks_for(t, id).await
    }
    async fn set_rag_status(&self, r: &RagStatusRecord) -> Result<()> {
        self.inner.set_rag_status(r).await
    }
    async fn get_rag_status(&self, t: DocumentType, id: i64) -> Result<Option<RagStatusRecord>> {
        self.inner.get_rag_status(t, id).await
    }
    async fn stats(&self) -> Result<ArchiveStats> {
        self.inner.stats().await
    }
}
