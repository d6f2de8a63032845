//! Persisted image fingerprints and exact-hash lookup.
//!
//! Every image attached to a document gets one row keyed by
//! `(document_type, document_id, image_index)`, where `image_index` is the
//! image's position in the document's image list. Saving again overwrites
//! the row in place.

use chrono::Utc;

use crate::fingerprint::is_valid_hash;
use crate::models::{DocumentType, FingerprintEntry, ImageFingerprint, ImageMatch};
use crate::store::Store;

/// Upper bound on rows returned by [`find_matches`].
pub const MAX_MATCHES: usize = 10;

/// Store the hashes of one document's images.
///
/// Entries without a hash are skipped but still consume their index, so
/// stored rows stay aligned with the document's image list. Returns the
/// number of rows written.
pub async fn save_fingerprints<S: Store + ?Sized>(
    store: &S,
    document_type: DocumentType,
    document_id: i64,
    entries: &[FingerprintEntry],
) -> anyhow::Result<usize> {
    let now = Utc::now().timestamp();
    let mut saved = 0;

    for (index, entry) in entries.iter().enumerate() {
        let Some(hash) = entry.hash.as_deref() else {
            continue;
        };
        store
            .upsert_fingerprint(&ImageFingerprint {
                document_type,
                document_id,
                image_index: index as i64,
                hash: hash.to_string(),
                image_path: entry.path.clone(),
                updated_at: now,
            })
            .await?;
        saved += 1;
    }

    tracing::debug!(
        %document_type,
        document_id,
        saved,
        total = entries.len(),
        "saved image fingerprints"
    );
    Ok(saved)
}

/// Documents of `document_type` that hold an image hashing to exactly
/// `hash`, newest first, one row per document.
///
/// Malformed hashes and store failures yield an empty list.
pub async fn find_matches<S: Store + ?Sized>(
    store: &S,
    document_type: DocumentType,
    hash: &str,
    exclude_document_id: Option<i64>,
) -> Vec<ImageMatch> {
    let hash = hash.trim().to_ascii_lowercase();
    if !is_valid_hash(&hash) {
        return Vec::new();
    }

    match store
        .find_image_matches(document_type, &hash, exclude_document_id, MAX_MATCHES)
        .await
    {
        Ok(mut matches) => {
            matches.retain(|m| Some(m.document_id) != exclude_document_id);
            matches
        }
        Err(e) => {
            tracing::warn!(%document_type, error = %e, "image match lookup failed");
            Vec::new()
        }
    }
}
