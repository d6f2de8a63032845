//! Core data models shared by the archive crates.
//!
//! [`DocumentType`] is the only way to name a document table. Its
//! [`TableSpec`] mapping is the allowlist every SQL statement draws table
//! and column names from; raw strings coming from callers are parsed with
//! [`DocumentType::parse`] and never interpolated directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of records kept in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Ordinance,
    Resolution,
    Minutes,
}

/// Table and column names backing one [`DocumentType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub title_column: &'static str,
    pub content_column: &'static str,
    pub image_column: &'static str,
    pub status_column: &'static str,
    pub date_column: &'static str,
}

const ORDINANCES: TableSpec = TableSpec {
    table: "ordinances",
    title_column: "title",
    content_column: "content",
    image_column: "image_path",
    status_column: "status",
    date_column: "created_at",
};

const RESOLUTIONS: TableSpec = TableSpec {
    table: "resolutions",
    title_column: "title",
    content_column: "content",
    image_column: "image_path",
    status_column: "status",
    date_column: "created_at",
};

const MINUTES: TableSpec = TableSpec {
    table: "minutes",
    title_column: "session_title",
    content_column: "content",
    image_column: "image_path",
    status_column: "status",
    date_column: "created_at",
};

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [
        DocumentType::Ordinance,
        DocumentType::Resolution,
        DocumentType::Minutes,
    ];

    /// Stable identifier stored in the fingerprint, chunk and ledger tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Ordinance => "ordinance",
            DocumentType::Resolution => "resolution",
            DocumentType::Minutes => "minutes",
        }
    }

    pub fn table_spec(&self) -> &'static TableSpec {
        match self {
            DocumentType::Ordinance => &ORDINANCES,
            DocumentType::Resolution => &RESOLUTIONS,
            DocumentType::Minutes => &MINUTES,
        }
    }

    /// Parse a caller-supplied type name. Accepts singular and plural
    /// forms, case-insensitively; anything else is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ordinance" | "ordinances" => Some(DocumentType::Ordinance),
            "resolution" | "resolutions" => Some(DocumentType::Resolution),
            "minutes" | "minute" | "minutes_of_meeting" => Some(DocumentType::Minutes),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::parse(s).ok_or_else(|| {
            anyhow::anyhow!(
                "unknown document type: '{}'. Must be ordinance, resolution, or minutes.",
                s
            )
        })
    }
}

/// A document row as read from one of the per-type tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Pipe-delimited list of image paths or URLs.
    pub image_path: Option<String>,
    pub status: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

impl DocumentRecord {
    /// The document's image list, in stored order, without blanks.
    pub fn image_paths(&self) -> Vec<String> {
        self.image_path
            .as_deref()
            .map(split_image_paths)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

/// Split a pipe-delimited image field into trimmed, non-empty paths.
pub fn split_image_paths(field: &str) -> Vec<String> {
    field
        .split('|')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// One image of a document handed to the duplicate index.
///
/// `hash` is `None` when the image could not be fingerprinted; the entry
/// still occupies its position in the document's image list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub path: String,
    pub hash: Option<String>,
}

/// A persisted image fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFingerprint {
    pub document_type: DocumentType,
    pub document_id: i64,
    pub image_index: i64,
    pub hash: String,
    pub image_path: String,
    pub updated_at: i64,
}

/// A document whose stored image hash equals the probed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMatch {
    pub document_id: i64,
    pub title: String,
    pub image_path: String,
}

/// How a text duplicate candidate was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fingerprint,
    TokenOverlap,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fingerprint => "fingerprint",
            MatchType::TokenOverlap => "token_overlap",
        }
    }
}

/// A near-duplicate document found for a piece of query text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCandidate {
    pub document_id: i64,
    pub title: String,
    pub score: f64,
    pub match_type: MatchType,
}

/// A slice of cleaned text produced by the chunk splitter.
///
/// `start` and `end` are character offsets into the splitter input; `text`
/// is that range with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPiece {
    pub index: i64,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// A chunk stored in the retrieval store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChunk {
    pub document_type: DocumentType,
    pub document_id: i64,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub hash: String,
    pub metadata: serde_json::Value,
}

/// Processing state of a document in the RAG ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RagStatus {
    Processing,
    Completed,
    Failed,
}

impl RagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RagStatus::Processing => "processing",
            RagStatus::Completed => "completed",
            RagStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(RagStatus::Processing),
            "completed" => Some(RagStatus::Completed),
            "failed" => Some(RagStatus::Failed),
            _ => None,
        }
    }
}

/// One row of the RAG processing ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagStatusRecord {
    pub document_type: DocumentType,
    pub document_id: i64,
    pub status: RagStatus,
    pub chunk_count: i64,
    pub error_message: Option<String>,
    pub last_processed_at: i64,
}
