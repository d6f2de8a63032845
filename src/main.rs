//! # Civic Archive CLI (`archive`)
//!
//! ## Usage
//!
//! ```bash
//! archive --config ./config/archive.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `archive init` | Create the SQLite database and run schema migrations |
//! | `archive fingerprint <source>` | Print the average hash of an image path or URL |
//! | `archive images save <type> <id> <field>` | Hash and store a document's images |
//! | `archive images match <type> <hash>` | List documents holding an image hash |
//! | `archive images backfill <type>` | Hash images of documents without fingerprints |
//! | `archive duplicates <type> --file F` | Find near-duplicate documents |
//! | `archive chunk --file F` | Preview chunking of a file |
//! | `archive rag process` | Chunk pending documents into the retrieval store |
//! | `archive stats` | Show database statistics |
//! | `archive serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! archive init --config ./config/archive.toml
//!
//! # Check a scanned ordinance against stored minutes scans
//! archive images match minutes 0f0f0f0f0f0f0f0f
//!
//! # Check an OCR'd file for duplicates before upload
//! archive duplicates ordinance --file ./scan-ocr.txt
//!
//! # Nightly chunking run
//! archive rag process --limit 200
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use civic_archive::{commands, config, migrate, server, stats};

/// Civic Archive CLI: image and text duplicate detection and RAG chunking
/// for a municipal document archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/archive.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "archive",
    about = "Civic Archive: duplicate detection and RAG chunking for municipal records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/archive.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the document tables,
    /// image_fingerprints, document_chunks and rag_processing_status.
    /// Safe to run repeatedly.
    Init,

    /// Compute the average hash of one image.
    ///
    /// The source is a URL (must be on a trusted host) or a path relative
    /// to the uploads root. Prints the hash, or `none` if the image could
    /// not be read or decoded.
    Fingerprint {
        source: String,

        /// Host to trust for this call in addition to the configured ones.
        #[arg(long)]
        host: Option<String>,
    },

    /// Image duplicate index operations.
    Images {
        #[command(subcommand)]
        action: ImagesAction,
    },

    /// Find stored documents that duplicate a piece of text.
    Duplicates {
        /// Document type: ordinance, resolution, or minutes.
        doc_type: String,

        /// Read the query text from a file (text, HTML or PDF).
        #[arg(long, conflicts_with = "id", required_unless_present = "id")]
        file: Option<PathBuf>,

        /// Use the content of a stored document as the query.
        #[arg(long)]
        id: Option<i64>,

        /// Document id to leave out of the results.
        #[arg(long)]
        exclude: Option<i64>,

        /// Maximum candidates to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Split a file into chunks as the RAG pipeline would.
    Chunk {
        /// File to chunk (text, HTML or PDF).
        #[arg(long)]
        file: PathBuf,

        /// Chunk size in characters. Defaults to `[chunking].chunk_size`.
        #[arg(long)]
        size: Option<usize>,

        /// Overlap in characters. Defaults to `[chunking].overlap`.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Retrieval pipeline commands.
    Rag {
        #[command(subcommand)]
        action: RagAction,
    },

    /// Show database statistics.
    Stats,

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ImagesAction {
    /// Hash a document's images and store the fingerprints.
    Save {
        doc_type: String,
        id: i64,
        /// Pipe-delimited image list, e.g. `2024/a.jpg|2024/b.jpg`.
        field: String,
    },

    /// List documents holding an image with exactly this hash.
    Match {
        doc_type: String,
        hash: String,
        #[arg(long)]
        exclude: Option<i64>,
    },

    /// Hash images of documents that have none stored yet.
    Backfill {
        doc_type: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum RagAction {
    /// Chunk pending documents and record them in the processing ledger.
    Process {
        /// Only process this document type.
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Maximum documents per type. Defaults to `[rag].batch_limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Also process documents already marked completed.
        #[arg(long)]
        reprocess: bool,

        /// Report counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Fingerprint { source, host } => {
            commands::run_fingerprint(&cfg, &source, host.as_deref()).await?;
        }
        Commands::Images { action } => match action {
            ImagesAction::Save {
                doc_type,
                id,
                field,
            } => {
                commands::run_images_save(&cfg, &doc_type, id, &field).await?;
            }
            ImagesAction::Match {
                doc_type,
                hash,
                exclude,
            } => {
                commands::run_images_match(&cfg, &doc_type, &hash, exclude).await?;
            }
            ImagesAction::Backfill { doc_type, limit } => {
                commands::run_images_backfill(&cfg, &doc_type, limit).await?;
            }
        },
        Commands::Duplicates {
            doc_type,
            file,
            id,
            exclude,
            limit,
        } => {
            let query = match (file, id) {
                (Some(path), _) => commands::DuplicateQuery::File(path),
                (None, Some(id)) => commands::DuplicateQuery::Document(id),
                (None, None) => anyhow::bail!("either --file or --id is required"),
            };
            commands::run_duplicates(&cfg, &doc_type, query, exclude, limit).await?;
        }
        Commands::Chunk {
            file,
            size,
            overlap,
        } => {
            commands::run_chunk(&cfg, &file, size, overlap)?;
        }
        Commands::Rag { action } => match action {
            RagAction::Process {
                doc_type,
                limit,
                reprocess,
                dry_run,
            } => {
                commands::run_rag_process(&cfg, doc_type.as_deref(), limit, reprocess, dry_run)
                    .await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
