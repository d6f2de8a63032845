//! SQLite store tests against a temporary database file.

use archive_core::duplicate::{find_duplicates, DuplicateParams, DuplicateRequest};
use archive_core::image_index::{find_matches, save_fingerprints};
use archive_core::models::{
    DocumentChunk, DocumentRecord, DocumentType, FingerprintEntry, MatchType, RagStatus,
    RagStatusRecord,
};
use archive_core::store::{CandidateQuery, Store};
use civic_archive::db::connect_path;
use civic_archive::migrate::migrate_pool;
use civic_archive::rag::{process_pending, RagSettings};
use civic_archive::sqlite_store::SqliteStore;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let pool = connect_path(&tmp.path().join("data/archive.sqlite"))
        .await
        .unwrap();
    migrate_pool(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn doc(id: i64, created_at: i64, content: &str) -> DocumentRecord {
    DocumentRecord {
        id,
        title: format!("Document {}", id),
        content: content.to_string(),
        image_path: None,
        status: "Active".to_string(),
        created_at,
    }
}

fn entry(path: &str, hash: Option<&str>) -> FingerprintEntry {
    FingerprintEntry {
        path: path.to_string(),
        hash: hash.map(str::to_string),
    }
}

const HASH: &str = "00ff00ff00ff00ff";

const ZONING: &str = "An ordinance amending the zoning map to reclassify the parcels along \
    Harbor Road from light industrial to mixed residential use, subject to the conditions \
    recommended by the planning commission.";

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_tmp, store) = setup().await;
    migrate_pool(store.pool()).await.unwrap();
    migrate_pool(store.pool()).await.unwrap();
}

#[tokio::test]
async fn test_upsert_insert_and_update() {
    let (_tmp, store) = setup().await;

    let id = store
        .upsert_document(DocumentType::Minutes, &doc(0, 10, "Roll call."))
        .await
        .unwrap();
    assert!(id > 0);

    let mut updated = doc(id, 10, "Roll call. Quorum present.");
    updated.title = "Regular Session".to_string();
    assert_eq!(
        store
            .upsert_document(DocumentType::Minutes, &updated)
            .await
            .unwrap(),
        id
    );

    let stored = store
        .get_document(DocumentType::Minutes, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Regular Session");
    assert_eq!(stored.content, "Roll call. Quorum present.");
    assert!(store
        .get_document(DocumentType::Ordinance, id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_candidates_window_order_and_exclusion() {
    let (_tmp, store) = setup().await;
    for (id, ts, len) in [(1, 10, 40), (2, 30, 100), (3, 20, 120), (4, 40, 110), (5, 50, 500)] {
        store
            .upsert_document(DocumentType::Resolution, &doc(id, ts, &"y".repeat(len)))
            .await
            .unwrap();
    }

    let rows = store
        .duplicate_candidates(&CandidateQuery {
            document_type: DocumentType::Resolution,
            min_length: 60,
            max_length: 200,
            exclude_document_id: Some(4),
            limit: 10,
        })
        .await
        .unwrap();
    let ids: Vec<i64> = rows.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![2, 3]);

    let limited = store
        .duplicate_candidates(&CandidateQuery {
            document_type: DocumentType::Resolution,
            min_length: 0,
            max_length: 1000,
            exclude_document_id: None,
            limit: 2,
        })
        .await
        .unwrap();
    let ids: Vec<i64> = limited.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![5, 4]);
}

#[tokio::test]
async fn test_image_index_on_sqlite() {
    let (_tmp, store) = setup().await;
    for id in 1..=3 {
        store
            .upsert_document(DocumentType::Ordinance, &doc(id, id * 10, ""))
            .await
            .unwrap();
    }

    save_fingerprints(
        &store,
        DocumentType::Ordinance,
        1,
        &[entry("a0.png", None), entry("a1.png", Some(HASH)), entry("a2.png", Some(HASH))],
    )
    .await
    .unwrap();
    save_fingerprints(&store, DocumentType::Ordinance, 2, &[entry("b0.png", Some(HASH))])
        .await
        .unwrap();
    // Orphaned fingerprint: no document 99 exists.
    save_fingerprints(&store, DocumentType::Ordinance, 99, &[entry("z.png", Some(HASH))])
        .await
        .unwrap();
    // Replay must not duplicate rows.
    save_fingerprints(&store, DocumentType::Ordinance, 2, &[entry("b0.png", Some(HASH))])
        .await
        .unwrap();

    let matches = find_matches(&store, DocumentType::Ordinance, HASH, None).await;
    let got: Vec<(i64, &str)> = matches
        .iter()
        .map(|m| (m.document_id, m.image_path.as_str()))
        .collect();
    assert_eq!(got, vec![(2, "b0.png"), (1, "a1.png")]);

    let excluding = find_matches(&store, DocumentType::Ordinance, HASH, Some(2)).await;
    assert_eq!(excluding.len(), 1);
    assert_eq!(excluding[0].document_id, 1);
    assert_eq!(excluding[0].title, "Document 1");

    assert!(find_matches(&store, DocumentType::Resolution, HASH, None)
        .await
        .is_empty());
    assert!(find_matches(&store, DocumentType::Ordinance, "xyz", None)
        .await
        .is_empty());

    let fps = store
        .fingerprints_for(DocumentType::Ordinance, 1)
        .await
        .unwrap();
    let indices: Vec<i64> = fps.iter().map(|f| f.image_index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[tokio::test]
async fn test_documents_without_fingerprints() {
    let (_tmp, store) = setup().await;
    let mut with_images = doc(1, 1, "");
    with_images.image_path = Some("a.png|b.png".to_string());
    let mut hashed = doc(2, 2, "");
    hashed.image_path = Some("c.png".to_string());
    let mut blank = doc(3, 3, "");
    blank.image_path = Some(" | ".to_string());
    for d in [&with_images, &hashed, &blank, &doc(4, 4, "")] {
        store.upsert_document(DocumentType::Minutes, d).await.unwrap();
    }
    save_fingerprints(&store, DocumentType::Minutes, 2, &[entry("c.png", Some(HASH))])
        .await
        .unwrap();

    let pending = store
        .documents_without_fingerprints(DocumentType::Minutes, 10)
        .await
        .unwrap();
    let ids: Vec<i64> = pending.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_chunks_and_ledger_round_trip() {
    let (_tmp, store) = setup().await;
    let chunk = |i: i64, text: &str| DocumentChunk {
        document_type: DocumentType::Resolution,
        document_id: 7,
        chunk_index: i,
        chunk_text: text.to_string(),
        hash: archive_core::chunk::content_hash(text),
        metadata: serde_json::json!({ "start": i * 10 }),
    };

    store
        .replace_chunks(
            DocumentType::Resolution,
            7,
            &[chunk(0, "a"), chunk(1, "b"), chunk(2, "c")],
        )
        .await
        .unwrap();
    store
        .replace_chunks(DocumentType::Resolution, 7, &[chunk(0, "only")])
        .await
        .unwrap();
    let chunks = store.chunks_for(DocumentType::Resolution, 7).await.unwrap();
    assert_eq!(chunks, vec![chunk(0, "only")]);

    let record = RagStatusRecord {
        document_type: DocumentType::Resolution,
        document_id: 7,
        status: RagStatus::Failed,
        chunk_count: 0,
        error_message: Some("timeout".to_string()),
        last_processed_at: 1_700_000_000,
    };
    store.set_rag_status(&record).await.unwrap();
    let mut done = record.clone();
    done.status = RagStatus::Completed;
    done.chunk_count = 1;
    done.error_message = None;
    store.set_rag_status(&done).await.unwrap();
    assert_eq!(
        store
            .get_rag_status(DocumentType::Resolution, 7)
            .await
            .unwrap(),
        Some(done)
    );

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.chunks, 1);
    assert!(stats
        .rag_status
        .contains(&(RagStatus::Completed, 1)));
    assert_eq!(stats.last_processed_at, Some(1_700_000_000));
}

#[tokio::test]
async fn test_duplicate_detection_on_sqlite() {
    let (_tmp, store) = setup().await;
    store
        .upsert_document(DocumentType::Ordinance, &doc(1, 100, ZONING))
        .await
        .unwrap();
    store
        .upsert_document(
            DocumentType::Ordinance,
            &doc(2, 200, &format!("<p>{}</p>", ZONING.to_uppercase())),
        )
        .await
        .unwrap();
    store
        .upsert_document(
            DocumentType::Ordinance,
            &doc(3, 300, "An ordinance establishing a curfew for minors in public parks."),
        )
        .await
        .unwrap();

    let mut req = DuplicateRequest::new(DocumentType::Ordinance, ZONING);
    req.exclude_document_id = Some(1);
    let found = find_duplicates(&store, &req, &DuplicateParams::default()).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].document_id, 2);
    assert_eq!(found[0].match_type, MatchType::Exact);
}

#[tokio::test]
async fn test_rag_pipeline_on_sqlite() {
    let (_tmp, store) = setup().await;
    let body: String = (0..40)
        .map(|i| format!("Section {} of the minutes records a vote of the council. ", i))
        .collect();
    let id = store
        .upsert_document(DocumentType::Minutes, &doc(0, 5, &body))
        .await
        .unwrap();

    let settings = RagSettings {
        document_types: vec![DocumentType::Minutes],
        batch_limit: 10,
        chunk_size: 500,
        overlap: 100,
        reprocess: false,
        dry_run: false,
    };
    let summary = process_pending(&store, &settings).await.unwrap();
    assert_eq!(summary.completed, 1);

    let chunks = store.chunks_for(DocumentType::Minutes, id).await.unwrap();
    assert_eq!(chunks.len(), summary.chunks_written);
    assert!(chunks.len() > 1);
    assert_eq!(chunks[0].metadata["title"], format!("Document {}", id));
    assert_eq!(chunks[0].metadata["start"], 0);

    let again = process_pending(&store, &settings).await.unwrap();
    assert_eq!(again.processed, 0);
}
