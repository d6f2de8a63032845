//! CLI command implementations.
//!
//! Each `run_*` function opens what it needs from the config, performs one
//! operation and prints a plain-text report to stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archive_core::chunk::split;
use archive_core::duplicate::{find_duplicates, DuplicateRequest};
use archive_core::image_index::find_matches;
use archive_core::models::DocumentType;
use archive_core::normalize::clean_markup;
use archive_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::extract::read_document_file;
use crate::fingerprint::{ImageFingerprinter, ImageSource};
use crate::images::{backfill, hash_document_images};
use crate::rag::{process_pending, RagSettings};
use crate::sqlite_store::SqliteStore;

/// Where `archive duplicates` reads its query text from.
pub enum DuplicateQuery {
    File(PathBuf),
    Document(i64),
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    Ok(SqliteStore::new(db::connect(config).await?))
}

pub async fn run_fingerprint(config: &Config, source: &str, host: Option<&str>) -> Result<()> {
    let fingerprinter = ImageFingerprinter::from_config(config)?;
    let hash = fingerprinter
        .compute_fingerprint(&ImageSource::from_stored(source), host)
        .await;
    match hash {
        Some(hash) => println!("{}", hash),
        None => println!("none"),
    }
    Ok(())
}

pub async fn run_images_save(config: &Config, doc_type: &str, id: i64, field: &str) -> Result<()> {
    let doc_type: DocumentType = doc_type.parse()?;
    let store = open_store(config).await?;
    let fingerprinter = ImageFingerprinter::from_config(config)?;

    let entries =
        hash_document_images(&store, &fingerprinter, doc_type, id, field, None).await?;

    println!("images save {} {}", doc_type, id);
    for (index, entry) in entries.iter().enumerate() {
        println!(
            "  [{}] {}  {}",
            index,
            entry.hash.as_deref().unwrap_or("skipped"),
            entry.path
        );
    }
    println!(
        "  saved: {} of {}",
        entries.iter().filter(|e| e.hash.is_some()).count(),
        entries.len()
    );
    store.pool().close().await;
    Ok(())
}

pub async fn run_images_match(
    config: &Config,
    doc_type: &str,
    hash: &str,
    exclude: Option<i64>,
) -> Result<()> {
    let doc_type: DocumentType = doc_type.parse()?;
    let store = open_store(config).await?;

    let matches = find_matches(&store, doc_type, hash, exclude).await;
    if matches.is_empty() {
        println!("No matching images.");
    } else {
        for m in &matches {
            println!("{:>8}  {}  ({})", m.document_id, m.title, m.image_path);
        }
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_images_backfill(config: &Config, doc_type: &str, limit: usize) -> Result<()> {
    let doc_type: DocumentType = doc_type.parse()?;
    let store = open_store(config).await?;
    let fingerprinter = ImageFingerprinter::from_config(config)?;

    let summary = backfill(&store, &fingerprinter, doc_type, limit).await?;
    println!("images backfill {}", doc_type);
    println!("  documents: {}", summary.documents);
    println!("  images hashed: {}", summary.images_hashed);
    println!("  images skipped: {}", summary.images_skipped);
    println!("  failed: {}", summary.failed);
    store.pool().close().await;
    Ok(())
}

pub async fn run_duplicates(
    config: &Config,
    doc_type: &str,
    query: DuplicateQuery,
    exclude: Option<i64>,
    limit: Option<usize>,
) -> Result<()> {
    let doc_type: DocumentType = doc_type.parse()?;
    let store = open_store(config).await?;

    let (text, exclude) = match query {
        DuplicateQuery::File(path) => (read_document_file(&path)?, exclude),
        DuplicateQuery::Document(id) => {
            let doc = store
                .get_document(doc_type, id)
                .await?
                .with_context(|| format!("{} {} not found", doc_type, id))?;
            (doc.content, exclude.or(Some(id)))
        }
    };

    let request = DuplicateRequest {
        document_type: doc_type,
        text: &text,
        exclude_document_id: exclude,
        candidate_limit: config.duplicates.candidate_limit,
        match_limit: limit.unwrap_or(config.duplicates.match_limit),
    };
    let candidates = find_duplicates(&store, &request, &config.duplicates.params()).await;

    if candidates.is_empty() {
        println!("No duplicates found.");
    } else {
        for c in &candidates {
            println!(
                "{:>8}  {:.3}  {:<13}  {}",
                c.document_id,
                c.score,
                c.match_type.as_str(),
                c.title
            );
        }
    }
    store.pool().close().await;
    Ok(())
}

pub fn run_chunk(
    config: &Config,
    file: &Path,
    size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let chunk_size = size.unwrap_or(config.chunking.chunk_size);
    let overlap = overlap.unwrap_or(config.chunking.overlap);
    if chunk_size == 0 {
        anyhow::bail!("--size must be > 0");
    }

    let text = clean_markup(&read_document_file(file)?);
    let pieces = split(&text, chunk_size, overlap);

    for piece in &pieces {
        println!(
            "--- chunk {} [{}..{}] ({} chars)",
            piece.index,
            piece.start,
            piece.end,
            piece.text.chars().count()
        );
        println!("{}", piece.text);
    }
    println!("{} chunks", pieces.len());
    Ok(())
}

pub async fn run_rag_process(
    config: &Config,
    doc_type: Option<&str>,
    limit: Option<usize>,
    reprocess: bool,
    dry_run: bool,
) -> Result<()> {
    let mut settings = RagSettings::from_config(config)?;
    if let Some(t) = doc_type {
        settings.document_types = vec![t.parse()?];
    }
    if let Some(limit) = limit {
        settings.batch_limit = limit.max(1);
    }
    settings.reprocess = reprocess;
    settings.dry_run = dry_run;

    let store = open_store(config).await?;
    let summary = process_pending(&store, &settings).await?;

    println!("rag process{}", if dry_run { " (dry-run)" } else { "" });
    println!("  processed: {}", summary.processed);
    println!("  completed: {}", summary.completed);
    println!("  failed: {}", summary.failed);
    println!("  skipped: {}", summary.skipped);
    if summary.types_failed > 0 {
        println!("  types failed: {}", summary.types_failed);
    }
    println!(
        "  chunks {}: {}",
        if dry_run { "estimated" } else { "written" },
        summary.chunks_written
    );
    store.pool().close().await;
    Ok(())
}
