//! Trusted-host URL validation and bounded image downloads.
//!
//! Remote images are only fetched from hosts on an explicit allowlist built
//! from the storage configuration plus the host of the current request.
//! URLs with embedded credentials or a scheme other than `http`/`https` are
//! rejected before any connection is made.
//!
//! Downloads use a bounded connect and total timeout, do not follow
//! redirects unless configured to, reject non-2xx responses and stop reading
//! once the body exceeds `max_bytes`.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Context;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::{FetchConfig, StorageConfig};

/// Why a source could not be turned into image bytes.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("url carries embedded credentials")]
    EmbeddedCredentials,
    #[error("host '{0}' is not on the trusted host list")]
    UntrustedHost(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("path '{0}' escapes the uploads root")]
    UnsafePath(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Lowercase a host, drop IPv6 brackets and a trailing dot.
pub fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Host part of a `Host` header value (`example.gov:8080`, `[::1]:80`).
pub fn host_from_header(value: &str) -> String {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        if let Some((inner, _)) = rest.split_once(']') {
            return normalize_host(inner);
        }
    }
    match value.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            normalize_host(host)
        }
        _ => normalize_host(value),
    }
}

/// The set of hosts remote images may be fetched from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedHosts {
    hosts: BTreeSet<String>,
}

impl TrustedHosts {
    /// Hosts of the storage endpoint and public base URL, plus the extra
    /// hosts listed in config.
    pub fn from_storage(storage: &StorageConfig) -> Self {
        let mut trusted = Self::default();
        for raw in [&storage.endpoint, &storage.public_base_url]
            .into_iter()
            .flatten()
        {
            match Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_string)) {
                Some(host) => trusted.add(&host),
                None => tracing::warn!(url = %raw, "storage url has no host, not trusted"),
            }
        }
        for host in &storage.extra_trusted_hosts {
            trusted.add(host);
        }
        trusted
    }

    pub fn add(&mut self, host: &str) {
        let host = normalize_host(host);
        if !host.is_empty() {
            self.hosts.insert(host);
        }
    }

    /// A copy extended with the host of the current request, if any.
    pub fn with_request_host(&self, request_host: Option<&str>) -> Self {
        let mut trusted = self.clone();
        if let Some(header) = request_host {
            trusted.add(&host_from_header(header));
        }
        trusted
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&normalize_host(host))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Parse `raw` and check scheme, credentials and host.
    pub fn validate(&self, raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw.trim()).map_err(|_| FetchError::InvalidUrl(raw.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(FetchError::EmbeddedCredentials);
        }
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(raw.to_string()))?;
        if !self.contains(host) {
            return Err(FetchError::UntrustedHost(normalize_host(host)));
        }
        Ok(url)
    }
}

/// HTTP client with the configured timeouts and size cap.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let redirect = if config.follow_redirects {
            Policy::limited(5)
        } else {
            Policy::none()
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect)
            .user_agent(concat!("civic-archive/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Download the body of an already validated URL.
    pub async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut resp = self.client.get(url.clone()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
