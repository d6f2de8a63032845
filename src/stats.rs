//! Archive statistics.
//!
//! A quick summary of what the duplicate index and the RAG store hold:
//! documents and fingerprints per type, chunk totals and the processing
//! ledger broken down by status. Used by `archive stats`.

use anyhow::Result;
use archive_core::store::{ArchiveStats, Store};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn collect_stats<S: Store + ?Sized>(store: &S) -> Result<ArchiveStats> {
    store.stats().await
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let stats = collect_stats(&store).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    print!("{}", render(&stats, &config.db.path.display().to_string(), db_size));

    pool.close().await;
    Ok(())
}

/// Render the stats table printed by `archive stats`.
pub fn render(stats: &ArchiveStats, db_path: &str, db_size: u64) -> String {
    let mut out = String::new();
    out.push_str("Civic Archive: Database Stats\n");
    out.push_str("=============================\n\n");
    out.push_str(&format!("  Database:    {}\n", db_path));
    out.push_str(&format!("  Size:        {}\n\n", format_bytes(db_size)));

    out.push_str(&format!("  {:<12} {:>10} {:>14}\n", "TYPE", "DOCUMENTS", "FINGERPRINTS"));
    out.push_str(&format!("  {}\n", "-".repeat(38)));
    for (doc_type, docs) in &stats.documents {
        let fps = stats
            .fingerprints
            .iter()
            .find(|(t, _)| t == doc_type)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        out.push_str(&format!("  {:<12} {:>10} {:>14}\n", doc_type.as_str(), docs, fps));
    }

    out.push('\n');
    out.push_str(&format!("  Chunks:      {}\n", stats.chunks));
    let ledger: Vec<String> = stats
        .rag_status
        .iter()
        .map(|(s, n)| format!("{} {}", n, s.as_str()))
        .collect();
    out.push_str(&format!("  RAG ledger:  {}\n", ledger.join(", ")));
    let last = match stats.last_processed_at {
        Some(ts) => format_ts_relative(ts),
        None => "never".to_string(),
    };
    out.push_str(&format!("  Last run:    {}\n\n", last));
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_core::models::{DocumentRecord, DocumentType, RagStatus, RagStatusRecord};
    use archive_core::store::memory::InMemoryStore;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn test_collect_and_render() {
        let store = InMemoryStore::new();
        store
            .upsert_document(
                DocumentType::Minutes,
                &DocumentRecord {
                    id: 0,
                    title: "Regular session".to_string(),
                    content: "Roll call.".to_string(),
                    image_path: None,
                    status: "Active".to_string(),
                    created_at: 0,
                },
            )
            .await
            .unwrap();
        store
            .set_rag_status(&RagStatusRecord {
                document_type: DocumentType::Minutes,
                document_id: 1,
                status: RagStatus::Failed,
                chunk_count: 0,
                error_message: Some("boom".to_string()),
                last_processed_at: chrono::Utc::now().timestamp(),
            })
            .await
            .unwrap();

        let stats = collect_stats(&store).await.unwrap();
        assert_eq!(
            stats.documents,
            vec![
                (DocumentType::Ordinance, 0),
                (DocumentType::Resolution, 0),
                (DocumentType::Minutes, 1)
            ]
        );
        let text = render(&stats, "archive.sqlite", 4096);
        assert!(text.contains("minutes"));
        assert!(text.contains("1 failed"));
        assert!(text.contains("just now"));
        assert!(text.contains("4.0 KB"));
    }
}
