//! Configuration parsing and validation.
//!
//! Civic Archive is configured with a TOML file (default
//! `./config/archive.toml`). Only `[db]` is required; every other section
//! falls back to the defaults below.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/archive.sqlite"
//!
//! [storage]
//! uploads_root = "./uploads"
//! endpoint = "https://objects.example.gov"
//! public_base_url = "https://cdn.example.gov"
//! extra_trusted_hosts = ["scans.example.gov"]
//!
//! [fetch]
//! connect_timeout_secs = 8
//! timeout_secs = 25
//! max_bytes = 20971520
//!
//! [duplicates]
//! min_text_length = 80
//! candidate_limit = 280
//! match_limit = 8
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [rag]
//! batch_limit = 50
//! document_types = ["ordinance", "resolution", "minutes"]
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use archive_core::duplicate::DuplicateParams;
use archive_core::models::DocumentType;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where uploaded scans live and which hosts may serve them.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_root")]
    pub uploads_root: PathBuf,
    /// Object-storage endpoint, e.g. `https://objects.example.gov`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Public base URL stored image links are served from.
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub extra_trusted_hosts: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_root: default_uploads_root(),
            endpoint: None,
            public_base_url: None,
            extra_trusted_hosts: Vec::new(),
        }
    }
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("./uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default)]
    pub follow_redirects: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
            max_bytes: default_max_bytes(),
            follow_redirects: false,
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    8
}
fn default_timeout_secs() -> u64 {
    25
}
fn default_max_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct DuplicatesConfig {
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_match_limit")]
    pub match_limit: usize,
    #[serde(default = "default_length_ratio_min")]
    pub length_ratio_min: f64,
    #[serde(default = "default_length_ratio_max")]
    pub length_ratio_max: f64,
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default = "default_token_length_ratio")]
    pub token_length_ratio: f64,
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
    #[serde(default = "default_coverage_weight")]
    pub coverage_weight: f64,
    #[serde(default = "default_length_weight")]
    pub length_weight: f64,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            min_text_length: default_min_text_length(),
            candidate_limit: default_candidate_limit(),
            match_limit: default_match_limit(),
            length_ratio_min: default_length_ratio_min(),
            length_ratio_max: default_length_ratio_max(),
            min_tokens: default_min_tokens(),
            token_length_ratio: default_token_length_ratio(),
            coverage_threshold: default_coverage_threshold(),
            coverage_weight: default_coverage_weight(),
            length_weight: default_length_weight(),
        }
    }
}

impl DuplicatesConfig {
    pub fn params(&self) -> DuplicateParams {
        DuplicateParams {
            min_text_length: self.min_text_length,
            length_ratio_min: self.length_ratio_min,
            length_ratio_max: self.length_ratio_max,
            min_tokens: self.min_tokens,
            token_length_ratio: self.token_length_ratio,
            coverage_threshold: self.coverage_threshold,
            coverage_weight: self.coverage_weight,
            length_weight: self.length_weight,
        }
    }
}

fn default_min_text_length() -> usize {
    80
}
fn default_candidate_limit() -> usize {
    280
}
fn default_match_limit() -> usize {
    8
}
fn default_length_ratio_min() -> f64 {
    0.55
}
fn default_length_ratio_max() -> f64 {
    1.60
}
fn default_min_tokens() -> usize {
    12
}
fn default_token_length_ratio() -> f64 {
    0.85
}
fn default_coverage_threshold() -> f64 {
    0.92
}
fn default_coverage_weight() -> f64 {
    0.85
}
fn default_length_weight() -> f64 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    archive_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    archive_core::chunk::DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_document_types")]
    pub document_types: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            document_types: default_document_types(),
        }
    }
}

impl RagConfig {
    /// The configured document types, parsed. Validated by [`load_config`].
    pub fn types(&self) -> Result<Vec<DocumentType>> {
        self.document_types.iter().map(|s| s.parse()).collect()
    }
}

fn default_batch_limit() -> usize {
    50
}
fn default_document_types() -> Vec<String> {
    DocumentType::ALL
        .iter()
        .map(|t| t.as_str().to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    // Validate fetch
    if config.fetch.connect_timeout_secs == 0 || config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch timeouts must be > 0");
    }
    if config.fetch.max_bytes == 0 {
        anyhow::bail!("fetch.max_bytes must be > 0");
    }

    // Validate duplicates
    let dup = &config.duplicates;
    if !(dup.length_ratio_min > 0.0 && dup.length_ratio_min <= 1.0) {
        anyhow::bail!("duplicates.length_ratio_min must be in (0.0, 1.0]");
    }
    if dup.length_ratio_max < 1.0 {
        anyhow::bail!("duplicates.length_ratio_max must be >= 1.0");
    }
    for (name, value) in [
        ("token_length_ratio", dup.token_length_ratio),
        ("coverage_threshold", dup.coverage_threshold),
        ("coverage_weight", dup.coverage_weight),
        ("length_weight", dup.length_weight),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("duplicates.{} must be in [0.0, 1.0]", name);
        }
    }

    // Validate rag
    if config.rag.batch_limit == 0 {
        anyhow::bail!("rag.batch_limit must be >= 1");
    }
    config.rag.types().context("Invalid rag.document_types")?;

    // Validate trusted hosts parse
    for (name, value) in [
        ("storage.endpoint", &config.storage.endpoint),
        ("storage.public_base_url", &config.storage.public_base_url),
    ] {
        if let Some(raw) = value {
            url::Url::parse(raw).with_context(|| format!("{} is not a valid URL: {}", name, raw))?;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/archive.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.fetch.connect_timeout_secs, 8);
        assert_eq!(config.fetch.timeout_secs, 25);
        assert_eq!(config.fetch.max_bytes, 20_971_520);
        assert!(!config.fetch.follow_redirects);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
        assert_eq!(config.rag.types().unwrap(), DocumentType::ALL.to_vec());
        assert_eq!(config.duplicates.params(), DuplicateParams::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = parse_config(
            r#"
[db]
path = "a.sqlite"

[duplicates]
min_text_length = 40
coverage_threshold = 0.8

[rag]
document_types = ["minutes"]
"#,
        )
        .unwrap();
        let params = config.duplicates.params();
        assert_eq!(params.min_text_length, 40);
        assert_eq!(params.coverage_threshold, 0.8);
        assert_eq!(params.min_tokens, 12);
        assert_eq!(config.rag.types().unwrap(), vec![DocumentType::Minutes]);
    }

    #[test]
    fn test_rejects_overlap_not_below_chunk_size() {
        let err = parse_config("[db]\npath = \"a\"\n[chunking]\nchunk_size = 100\noverlap = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_rejects_unknown_rag_type() {
        assert!(parse_config("[db]\npath = \"a\"\n[rag]\ndocument_types = [\"budgets\"]\n").is_err());
    }

    #[test]
    fn test_rejects_weight_out_of_range() {
        assert!(
            parse_config("[db]\npath = \"a\"\n[duplicates]\ncoverage_weight = 1.5\n").is_err()
        );
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(parse_config("[db]\npath = \"a\"\n[storage]\nendpoint = \"not a url\"\n").is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/archive.example.toml")).unwrap();
        assert_eq!(config.duplicates.candidate_limit, 280);
        assert!(!config.fetch.follow_redirects);
    }

    #[test]
    fn test_missing_db_section_fails() {
        assert!(parse_config("[server]\nbind = \"0.0.0.0:1\"\n").is_err());
    }
}
