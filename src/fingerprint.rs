//! Image fingerprinting over in-memory, local and remote sources.
//!
//! [`ImageFingerprinter::compute_fingerprint`] resolves a source to bytes,
//! hashes them with [`archive_core::fingerprint::average_hash`] and drops
//! the bytes. Every failure along the way (untrusted host, missing file,
//! undecodable image) is logged and yields `None`.

use std::path::{Component, Path, PathBuf};

use archive_core::fingerprint::average_hash;

use crate::config::Config;
use crate::fetch::{FetchError, Fetcher, TrustedHosts};

/// Where image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    /// Path relative to the uploads root.
    Path(String),
    Url(String),
}

impl ImageSource {
    /// Classify an entry of a document's image field. Anything with a
    /// scheme separator is a URL, everything else a local path.
    pub fn from_stored(value: &str) -> Self {
        let value = value.trim();
        if value.contains("://") {
            ImageSource::Url(value.to_string())
        } else {
            ImageSource::Path(value.to_string())
        }
    }

    fn describe(&self) -> String {
        match self {
            ImageSource::Bytes(b) => format!("<{} bytes>", b.len()),
            ImageSource::Path(p) => p.clone(),
            ImageSource::Url(u) => u.clone(),
        }
    }
}

pub struct ImageFingerprinter {
    trusted: TrustedHosts,
    fetcher: Fetcher,
    uploads_root: PathBuf,
}

impl ImageFingerprinter {
    pub fn new(trusted: TrustedHosts, fetcher: Fetcher, uploads_root: PathBuf) -> Self {
        Self {
            trusted,
            fetcher,
            uploads_root,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            TrustedHosts::from_storage(&config.storage),
            Fetcher::new(&config.fetch)?,
            config.storage.uploads_root.clone(),
        ))
    }

    pub fn trusted_hosts(&self) -> &TrustedHosts {
        &self.trusted
    }

    /// Average hash of the image behind `source`, or `None` if it cannot be
    /// read, fetched or decoded. `request_host` is the host of the request
    /// that triggered the call and is trusted for this call only.
    pub async fn compute_fingerprint(
        &self,
        source: &ImageSource,
        request_host: Option<&str>,
    ) -> Option<String> {
        let bytes = match source {
            ImageSource::Bytes(b) => return average_hash(b),
            ImageSource::Path(p) => self.read_local(p).await,
            ImageSource::Url(u) => self.fetch_remote(u, request_host).await,
        };

        match bytes {
            Ok(bytes) => {
                let hash = average_hash(&bytes);
                if hash.is_none() {
                    tracing::debug!(source = %source.describe(), "image not decodable");
                }
                hash
            }
            Err(e) => {
                match &e {
                    FetchError::Request(_) | FetchError::Status(_) | FetchError::Io(_) => {
                        tracing::warn!(source = %source.describe(), error = %e, "image skipped")
                    }
                    _ => tracing::debug!(source = %source.describe(), error = %e, "image skipped"),
                }
                None
            }
        }
    }

    /// Resolve a stored path against the uploads root. Rejects `..`
    /// components and absolute paths outside the root.
    pub fn resolve_local(&self, stored: &str) -> Result<PathBuf, FetchError> {
        let path = Path::new(stored);
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(FetchError::UnsafePath(stored.to_string()));
        }
        if path.is_absolute() {
            if path.starts_with(&self.uploads_root) {
                return Ok(path.to_path_buf());
            }
            return Err(FetchError::UnsafePath(stored.to_string()));
        }
        Ok(self.uploads_root.join(path))
    }

    async fn read_local(&self, stored: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve_local(stored)?;
        let meta = tokio::fs::metadata(&path).await?;
        if meta.len() > self.fetcher.max_bytes() as u64 {
            return Err(FetchError::TooLarge {
                limit: self.fetcher.max_bytes(),
            });
        }
        Ok(tokio::fs::read(&path).await?)
    }

    async fn fetch_remote(
        &self,
        raw: &str,
        request_host: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.trusted.with_request_host(request_host).validate(raw)?;
        self.fetcher.fetch(&url).await
    }
}
