//! Document-level image operations: hash and save a document's images,
//! check images against the index before saving, and backfill documents
//! that were stored before fingerprinting existed.

use anyhow::Result;
use serde::Serialize;

use archive_core::image_index::{find_matches, save_fingerprints};
use archive_core::models::{split_image_paths, DocumentType, FingerprintEntry, ImageMatch};
use archive_core::store::Store;

use crate::fingerprint::{ImageFingerprinter, ImageSource};

/// Result of checking one image against the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageCheck {
    pub path: String,
    pub hash: Option<String>,
    pub matches: Vec<ImageMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillSummary {
    pub documents: usize,
    pub images_hashed: usize,
    pub images_skipped: usize,
    /// Documents whose fingerprints could not be stored.
    pub failed: usize,
}

/// Fingerprint every entry of a pipe-delimited image field, in order.
pub async fn fingerprint_field(
    fingerprinter: &ImageFingerprinter,
    image_field: &str,
    request_host: Option<&str>,
) -> Vec<FingerprintEntry> {
    let mut entries = Vec::new();
    for path in split_image_paths(image_field) {
        let hash = fingerprinter
            .compute_fingerprint(&ImageSource::from_stored(&path), request_host)
            .await;
        entries.push(FingerprintEntry { path, hash });
    }
    entries
}

/// Hash a document's images and store the fingerprints. Returns the
/// entries, including those that could not be hashed.
pub async fn hash_document_images<S: Store + ?Sized>(
    store: &S,
    fingerprinter: &ImageFingerprinter,
    document_type: DocumentType,
    document_id: i64,
    image_field: &str,
    request_host: Option<&str>,
) -> Result<Vec<FingerprintEntry>> {
    let entries = fingerprint_field(fingerprinter, image_field, request_host).await;
    save_fingerprints(store, document_type, document_id, &entries).await?;
    Ok(entries)
}

/// Hash each image and look up documents already holding it.
pub async fn check_images<S: Store + ?Sized>(
    store: &S,
    fingerprinter: &ImageFingerprinter,
    document_type: DocumentType,
    image_field: &str,
    exclude_document_id: Option<i64>,
    request_host: Option<&str>,
) -> Vec<ImageCheck> {
    let mut checks = Vec::new();
    for entry in fingerprint_field(fingerprinter, image_field, request_host).await {
        let matches = match &entry.hash {
            Some(hash) => find_matches(store, document_type, hash, exclude_document_id).await,
            None => Vec::new(),
        };
        checks.push(ImageCheck {
            path: entry.path,
            hash: entry.hash,
            matches,
        });
    }
    checks
}

/// Hash the images of up to `limit` documents that have an image field but
/// no stored fingerprints.
pub async fn backfill<S: Store + ?Sized>(
    store: &S,
    fingerprinter: &ImageFingerprinter,
    document_type: DocumentType,
    limit: usize,
) -> Result<BackfillSummary> {
    let docs = store
        .documents_without_fingerprints(document_type, limit)
        .await?;
    let mut summary = BackfillSummary::default();

    for doc in &docs {
        let field = doc.image_path.as_deref().unwrap_or_default();
        let entries =
            match hash_document_images(store, fingerprinter, document_type, doc.id, field, None)
                .await
            {
                Ok(entries) => entries,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        %document_type,
                        document_id = doc.id,
                        error = %format!("{:#}", e),
                        "could not store fingerprints"
                    );
                    continue;
                }
            };
        let hashed = entries.iter().filter(|e| e.hash.is_some()).count();
        summary.documents += 1;
        summary.images_hashed += hashed;
        summary.images_skipped += entries.len() - hashed;
        if hashed == 0 {
            tracing::warn!(%document_type, document_id = doc.id, "no image of document could be hashed");
        }
    }

    tracing::info!(
        %document_type,
        documents = summary.documents,
        hashed = summary.images_hashed,
        skipped = summary.images_skipped,
        failed = summary.failed,
        "image backfill finished"
    );
    Ok(summary)
}
