//! In-memory [`Store`] implementation for tests and tooling.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Ordering and grouping rules
//! mirror the SQLite store: newest document first (`created_at`, then id),
//! one match row per document, chunk lists sorted by index.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    DocumentChunk, DocumentRecord, DocumentType, ImageFingerprint, ImageMatch, RagStatus,
    RagStatusRecord,
};

use super::{ArchiveStats, CandidateQuery, Store};

type DocKey = (DocumentType, i64);

/// In-memory store.
///
/// Methods holding more than one lock acquire them in field order:
/// `docs`, `fingerprints`, `chunks`, `ledger`.
pub struct InMemoryStore {
    docs: RwLock<HashMap<DocKey, DocumentRecord>>,
    fingerprints: RwLock<HashMap<(DocumentType, i64, i64), ImageFingerprint>>,
    chunks: RwLock<HashMap<DocKey, Vec<DocumentChunk>>>,
    ledger: RwLock<HashMap<DocKey, RagStatusRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            fingerprints: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
            ledger: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(docs: &mut [DocumentRecord]) {
    docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc_type: DocumentType, doc: &DocumentRecord) -> Result<i64> {
        let mut docs = self.docs.write().unwrap();
        let id = if doc.id > 0 {
            doc.id
        } else {
            docs.keys()
                .filter(|(t, _)| *t == doc_type)
                .map(|(_, id)| *id)
                .max()
                .unwrap_or(0)
                + 1
        };
        let mut stored = doc.clone();
        stored.id = id;
        docs.insert((doc_type, id), stored);
        Ok(id)
    }

    async fn get_document(
        &self,
        doc_type: DocumentType,
        id: i64,
    ) -> Result<Option<DocumentRecord>> {
        Ok(self.docs.read().unwrap().get(&(doc_type, id)).cloned())
    }

    async fn duplicate_candidates(&self, query: &CandidateQuery) -> Result<Vec<DocumentRecord>> {
        let docs = self.docs.read().unwrap();
        let mut rows: Vec<DocumentRecord> = docs
            .iter()
            .filter(|((t, id), _)| {
                *t == query.document_type && Some(*id) != query.exclude_document_id
            })
            .map(|(_, d)| d)
            .filter(|d| {
                let len = d.content.chars().count();
                len >= query.min_length && len <= query.max_length
            })
            .cloned()
            .collect();
        newest_first(&mut rows);
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn upsert_fingerprint(&self, fp: &ImageFingerprint) -> Result<()> {
        self.fingerprints.write().unwrap().insert(
            (fp.document_type, fp.document_id, fp.image_index),
            fp.clone(),
        );
        Ok(())
    }

    async fn fingerprints_for(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Vec<ImageFingerprint>> {
        let fps = self.fingerprints.read().unwrap();
        let mut rows: Vec<ImageFingerprint> = fps
            .values()
            .filter(|f| f.document_type == doc_type && f.document_id == document_id)
            .cloned()
            .collect();
        rows.sort_by_key(|f| f.image_index);
        Ok(rows)
    }

    async fn find_image_matches(
        &self,
        doc_type: DocumentType,
        hash: &str,
        exclude_document_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ImageMatch>> {
        let docs = self.docs.read().unwrap();
        let fps = self.fingerprints.read().unwrap();

        // First matching image per document.
        let mut first_image: HashMap<i64, &ImageFingerprint> = HashMap::new();
        for fp in fps.values() {
            if fp.document_type != doc_type
                || fp.hash != hash
                || Some(fp.document_id) == exclude_document_id
            {
                continue;
            }
            first_image
                .entry(fp.document_id)
                .and_modify(|cur| {
                    if fp.image_index < cur.image_index {
                        *cur = fp;
                    }
                })
                .or_insert(fp);
        }

        let mut matched: Vec<(&DocumentRecord, &ImageFingerprint)> = first_image
            .into_iter()
            .filter_map(|(id, fp)| docs.get(&(doc_type, id)).map(|d| (d, fp)))
            .collect();
        matched.sort_by(|(a, _), (b, _)| {
            b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
        });

        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(d, fp)| ImageMatch {
                document_id: d.id,
                title: d.title.clone(),
                image_path: fp.image_path.clone(),
            })
            .collect())
    }

    async fn documents_without_fingerprints(
        &self,
        doc_type: DocumentType,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let docs = self.docs.read().unwrap();
        let fps = self.fingerprints.read().unwrap();
        let mut rows: Vec<DocumentRecord> = docs
            .iter()
            .filter(|((t, _), d)| *t == doc_type && !d.image_paths().is_empty())
            .filter(|((_, id), _)| {
                !fps.values()
                    .any(|f| f.document_type == doc_type && f.document_id == *id)
            })
            .map(|(_, d)| d.clone())
            .collect();
        newest_first(&mut rows);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn rag_candidates(
        &self,
        doc_type: DocumentType,
        limit: usize,
        include_completed: bool,
    ) -> Result<Vec<DocumentRecord>> {
        let docs = self.docs.read().unwrap();
        let ledger = self.ledger.read().unwrap();
        let mut rows: Vec<DocumentRecord> = docs
            .iter()
            .filter(|((t, _), d)| *t == doc_type && d.is_active() && !d.content.trim().is_empty())
            .filter(|(key, _)| {
                include_completed
                    || ledger
                        .get(*key)
                        .map(|r| r.status != RagStatus::Completed)
                        .unwrap_or(true)
            })
            .map(|(_, d)| d.clone())
            .collect();
        newest_first(&mut rows);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn replace_chunks(
        &self,
        doc_type: DocumentType,
        document_id: i64,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        if chunks.is_empty() {
            stored.remove(&(doc_type, document_id));
        } else {
            let mut sorted = chunks.to_vec();
            sorted.sort_by_key(|c| c.chunk_index);
            stored.insert((doc_type, document_id), sorted);
        }
        Ok(())
    }

    async fn chunks_for(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .get(&(doc_type, document_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_rag_status(&self, record: &RagStatusRecord) -> Result<()> {
        self.ledger
            .write()
            .unwrap()
            .insert((record.document_type, record.document_id), record.clone());
        Ok(())
    }

    async fn get_rag_status(
        &self,
        doc_type: DocumentType,
        document_id: i64,
    ) -> Result<Option<RagStatusRecord>> {
        Ok(self
            .ledger
            .read()
            .unwrap()
            .get(&(doc_type, document_id))
            .cloned())
    }

    async fn stats(&self) -> Result<ArchiveStats> {
        let docs = self.docs.read().unwrap();
        let fps = self.fingerprints.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        let ledger = self.ledger.read().unwrap();

        let count_docs = |t: DocumentType| docs.keys().filter(|(k, _)| *k == t).count() as i64;
        let count_fps =
            |t: DocumentType| fps.values().filter(|f| f.document_type == t).count() as i64;

        Ok(ArchiveStats {
            documents: DocumentType::ALL.iter().map(|&t| (t, count_docs(t))).collect(),
            fingerprints: DocumentType::ALL.iter().map(|&t| (t, count_fps(t))).collect(),
            chunks: chunks.values().map(|v| v.len() as i64).sum(),
            rag_status: [RagStatus::Processing, RagStatus::Completed, RagStatus::Failed]
                .iter()
                .map(|&s| (s, ledger.values().filter(|r| r.status == s).count() as i64))
                .collect(),
            last_processed_at: ledger.values().map(|r| r.last_processed_at).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, created_at: i64, content: &str) -> DocumentRecord {
        DocumentRecord {
            id,
            title: format!("Doc {}", id),
            content: content.to_string(),
            image_path: None,
            status: "Active".to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_assigns_ids_per_type() {
        let store = InMemoryStore::new();
        let a = store
            .upsert_document(DocumentType::Ordinance, &doc(0, 1, "a"))
            .await
            .unwrap();
        let b = store
            .upsert_document(DocumentType::Ordinance, &doc(0, 2, "b"))
            .await
            .unwrap();
        let c = store
            .upsert_document(DocumentType::Minutes, &doc(0, 3, "c"))
            .await
            .unwrap();
        assert_eq!((a, b, c), (1, 2, 1));
    }

    #[tokio::test]
    async fn test_candidates_respect_length_window_and_order() {
        let store = InMemoryStore::new();
        for (id, ts, len) in [(1, 10, 50), (2, 30, 100), (3, 20, 120), (4, 40, 400)] {
            store
                .upsert_document(DocumentType::Resolution, &doc(id, ts, &"x".repeat(len)))
                .await
                .unwrap();
        }
        let rows = store
            .duplicate_candidates(&CandidateQuery {
                document_type: DocumentType::Resolution,
                min_length: 60,
                max_length: 200,
                exclude_document_id: None,
                limit: 10,
            })
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writers_make_progress() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let hash = "00ff00ff00ff00ff";
        let mut tasks = Vec::new();

        for worker in 0..4i64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..300i64 {
                    let id = worker * 1000 + i + 1;
                    let mut d = doc(id, id, "text");
                    d.image_path = Some("a.png".to_string());
                    store.upsert_document(DocumentType::Minutes, &d).await.unwrap();
                    store
                        .upsert_fingerprint(&ImageFingerprint {
                            document_type: DocumentType::Minutes,
                            document_id: id,
                            image_index: 0,
                            hash: hash.to_string(),
                            image_path: "a.png".to_string(),
                            updated_at: i,
                        })
                        .await
                        .unwrap();
                    store
                        .find_image_matches(DocumentType::Minutes, hash, None, 10)
                        .await
                        .unwrap();
                    store
                        .documents_without_fingerprints(DocumentType::Minutes, 10)
                        .await
                        .unwrap();
                    store.stats().await.unwrap();
                }
            }));
        }

        let all = async {
            for task in tasks {
                task.await.unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(30), all)
            .await
            .expect("store operations deadlocked");

        let stats = store.stats().await.unwrap();
        assert!(stats.fingerprints.contains(&(DocumentType::Minutes, 1200)));
    }
}
