//! HTTP tile source with layered caching.
//!
//! Fetches tiles from a template URL, with an in-memory byte cache in front
//! of an optional on-disk cache in front of the network. Transient failures
//! retry with exponential backoff up to a bounded attempt count; a miss at
//! every layer delivers the final error to the controller, which owns the
//! longer-horizon retry/cooldown policy.
//!
//! The HTTP transport sits behind the [`HttpClient`] trait so tests inject a
//! mock instead of a live server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CompletionSink, FetchCompletion, FetchError, TileFetcher};
use crate::coord::TileAddress;

/// Default bound on HTTP attempts per fetch (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial retry delay; doubles per attempt.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default in-memory byte cache capacity (64 MB).
pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// Trait for HTTP transport operations.
///
/// This abstraction allows for dependency injection and easier testing by
/// enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync + 'static {
    /// Performs an HTTP GET and resolves to the response body.
    fn get(&self, url: &str) -> BoxFuture<'static, Result<Bytes, FetchError>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();
        Box::pin(async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                // Callers translate by address; the URL is the best we have.
                return Err(FetchError::Http(format!("HTTP 404 from {}", url)));
            }
            if !status.is_success() {
                return Err(FetchError::Http(format!("HTTP {} from {}", status, url)));
            }

            response
                .bytes()
                .await
                .map_err(|e| FetchError::Http(format!("Failed to read response: {}", e)))
        })
    }
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// URL template with `{level}`, `{x}`, `{y}` placeholders.
    pub url_template: String,
    /// Maximum HTTP attempts per fetch (including the first).
    pub max_attempts: u32,
    /// Initial delay before the first retry; doubles per attempt.
    pub retry_delay: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// In-memory byte cache capacity in bytes.
    pub memory_cache_bytes: u64,
    /// Directory for the on-disk byte cache; `None` disables it.
    pub disk_cache_dir: Option<PathBuf>,
}

impl HttpFetcherConfig {
    /// Creates a config for the given URL template with default limits.
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
            disk_cache_dir: None,
        }
    }
}

/// Template-URL web tile source with memory and disk caches.
pub struct HttpFetcher {
    config: HttpFetcherConfig,
    client: Arc<dyn HttpClient>,
    memory_cache: moka::future::Cache<TileAddress, Bytes>,
    in_flight: Arc<DashMap<TileAddress, CancellationToken>>,
}

impl HttpFetcher {
    /// Creates a fetcher backed by a real reqwest transport.
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Arc::new(ReqwestClient::new(config.request_timeout)?);
        Ok(Self::with_client(config, client))
    }

    /// Creates a fetcher with an injected transport (tests).
    pub fn with_client(config: HttpFetcherConfig, client: Arc<dyn HttpClient>) -> Self {
        let memory_cache = moka::future::Cache::builder()
            .max_capacity(config.memory_cache_bytes)
            .weigher(|_key, value: &Bytes| value.len().try_into().unwrap_or(u32::MAX))
            .build();
        Self {
            config,
            client,
            memory_cache,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Expands the URL template for an address.
    pub fn url_for(&self, address: &TileAddress) -> String {
        self.config
            .url_template
            .replace("{level}", &address.level.to_string())
            .replace("{x}", &address.x.to_string())
            .replace("{y}", &address.y.to_string())
    }

    fn disk_path(dir: &Path, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        dir.join(&hex[..2]).join(format!("{}.bin", hex))
    }

    fn is_retryable(error: &FetchError) -> bool {
        match error {
            FetchError::Http(msg) => !msg.contains("HTTP 404"),
            FetchError::Io(_) | FetchError::Timeout(_) => true,
            FetchError::NotFound(_) | FetchError::Injected(_) => false,
        }
    }

    async fn fetch_with_retry(
        client: &Arc<dyn HttpClient>,
        url: &str,
        max_attempts: u32,
        mut delay: Duration,
    ) -> Result<Bytes, FetchError> {
        let mut attempt = 1;
        loop {
            match client.get(url).await {
                Ok(data) => return Ok(data),
                Err(e) if attempt < max_attempts && Self::is_retryable(&e) => {
                    debug!(url, attempt, %e, "Fetch attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load(
        client: Arc<dyn HttpClient>,
        memory_cache: moka::future::Cache<TileAddress, Bytes>,
        address: TileAddress,
        url: String,
        disk_cache_dir: Option<PathBuf>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Bytes, FetchError> {
        if let Some(data) = memory_cache.get(&address).await {
            debug!(tile = %address, "Memory cache hit");
            return Ok(data);
        }

        let disk_path = disk_cache_dir.as_deref().map(|dir| Self::disk_path(dir, &url));
        if let Some(path) = &disk_path {
            if let Ok(data) = tokio::fs::read(path).await {
                debug!(tile = %address, path = %path.display(), "Disk cache hit");
                let data = Bytes::from(data);
                memory_cache.insert(address, data.clone()).await;
                return Ok(data);
            }
        }

        let data = Self::fetch_with_retry(&client, &url, max_attempts, retry_delay).await?;
        memory_cache.insert(address, data.clone()).await;

        if let Some(path) = &disk_path {
            if let Some(parent) = path.parent() {
                let write = async {
                    tokio::fs::create_dir_all(parent).await?;
                    tokio::fs::write(path, &data).await
                };
                if let Err(e) = write.await {
                    // Cache write failure never fails the fetch.
                    warn!(path = %path.display(), %e, "Failed to write disk cache entry");
                }
            }
        }

        Ok(data)
    }
}

impl TileFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn start_fetch(&self, address: TileAddress, generation: u64, completions: CompletionSink) {
        let token = CancellationToken::new();
        // A replacement fetch for the same address overwrites the token; the
        // superseded worker runs on and its result dies at the generation check.
        self.in_flight.insert(address, token.clone());

        let client = Arc::clone(&self.client);
        let memory_cache = self.memory_cache.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let url = self.url_for(&address);
        let disk_cache_dir = self.config.disk_cache_dir.clone();
        let max_attempts = self.config.max_attempts;
        let retry_delay = self.config.retry_delay;

        tokio::spawn(async move {
            let load = Self::load(
                client,
                memory_cache,
                address,
                url,
                disk_cache_dir,
                max_attempts,
                retry_delay,
            );

            tokio::select! {
                _ = token.cancelled() => {
                    debug!(tile = %address, "Fetch cancelled before completion");
                }
                result = load => {
                    completions.deliver(FetchCompletion { address, generation, result });
                }
            }
            in_flight.remove(&address);
        });
    }

    fn cancel_fetch(&self, address: TileAddress) {
        if let Some((_, token)) = self.in_flight.remove(&address) {
            token.cancel();
        }
    }
}
