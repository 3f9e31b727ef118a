//! Request pipeline: cache lookup, gated and retried transport, row transform, cache store.
//!
//! Every API call funnels through [`Client::execute`]:
//!
//! ```text
//! query ──▶ cache hit? ──yes──▶ rows
//!               │no
//!               ▼
//!        ConcurrencyLimiter ──▶ RetryExecutor ──▶ Transport::send
//!               │
//!               ▼
//!          transform ──▶ cache store ──▶ rows
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::cache::{generate_key, CacheMode, CacheProvider, InMemoryCache};
use crate::config::ClientConfig;
use crate::error::{ApiError, ConfigError};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::response::{Params, RequestDescriptor, Row};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::throttling::{ConcurrencyConfig, ConcurrencyLimiter};
use crate::transport::Transport;

/// Client for the columnar query API.
///
/// Clones share the same limiter and cache, so a clone counts against the same
/// concurrency budget as the original.
#[derive(Clone)]
pub struct Client {
    token: String,
    transport: Transport,
    retry: RetryExecutor,
    limiter: ConcurrencyLimiter,
    cache: Option<Arc<dyn CacheProvider>>,
    cache_ttl: Duration,
    namespace: String,
}

impl Client {
    /// Builds a client from `config` with the default reqwest transport.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Builds the descriptor for one call using this client's token.
    pub fn descriptor(
        &self,
        endpoint: &str,
        params: Params,
        fields: Option<&[&str]>,
    ) -> RequestDescriptor {
        let descriptor = RequestDescriptor::new(endpoint, self.token.clone(), params);
        match fields {
            Some(fields) => descriptor.with_fields(fields.iter().copied()),
            None => descriptor,
        }
    }

    /// Fetches `endpoint` and returns its rows, serving from the cache when possible.
    pub async fn query(
        &self,
        endpoint: &str,
        params: Params,
        fields: Option<&[&str]>,
    ) -> Result<Vec<Row>, ApiError> {
        self.query_with_mode(endpoint, params, fields, CacheMode::Use).await
    }

    pub async fn query_with_mode(
        &self,
        endpoint: &str,
        params: Params,
        fields: Option<&[&str]>,
        mode: CacheMode,
    ) -> Result<Vec<Row>, ApiError> {
        let descriptor = self.descriptor(endpoint, params, fields);
        self.execute(&descriptor, mode).await
    }

    /// Like [`query`](Self::query) but deserializes each row into `T`.
    ///
    /// A row that does not fit `T` fails the whole call with an `Unknown` error.
    pub async fn query_as<T>(
        &self,
        endpoint: &str,
        params: Params,
        fields: Option<&[&str]>,
    ) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let rows = self.query(endpoint, params, fields).await?;
        rows.into_iter()
            .map(|row| {
                serde_json::to_value(row)
                    .and_then(serde_json::from_value)
                    .map_err(|e| {
                        let message =
                            format!("row from '{endpoint}' does not match target type: {e}");
                        ApiError::unknown(message).with_cause(e)
                    })
            })
            .collect()
    }

    /// Runs one descriptor through the full pipeline.
    ///
    /// Errors from the transport propagate unchanged; nothing is cached on failure.
    pub async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        mode: CacheMode,
    ) -> Result<Vec<Row>, ApiError> {
        let cache = match self.cache.as_deref() {
            Some(cache) if mode != CacheMode::Bypass => Some((
                cache,
                generate_key(&self.namespace, &descriptor.endpoint, &descriptor.params),
            )),
            _ => None,
        };

        if let Some((cache, key)) = &cache {
            if mode.reads() {
                if let Some(rows) = cache.get(key).await {
                    tracing::debug!(%key, rows = rows.len(), "cache hit");
                    return Ok(rows);
                }
                tracing::debug!(%key, "cache miss");
            }
        }

        let label = descriptor.endpoint.as_str();
        let response = self
            .limiter
            .execute(|| self.retry.execute(|| self.transport.send(descriptor), label))
            .await?;
        let rows = response.into_rows();

        if let Some((cache, key)) = &cache {
            if mode.writes() {
                cache.set(key, rows.clone(), self.cache_ttl).await;
                tracing::debug!(
                    %key,
                    rows = rows.len(),
                    ttl_ms = self.cache_ttl.as_millis() as u64,
                    "cached response"
                );
            }
        }

        Ok(rows)
    }

    /// Drops the cached result for one logical request, if caching is enabled.
    pub async fn invalidate(&self, endpoint: &str, params: &Params) {
        if let Some(cache) = &self.cache {
            let key = generate_key(&self.namespace, endpoint, params);
            cache.delete(&key).await;
        }
    }

    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }
}

/// Builder for [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use ferroshare_core::{ClientBuilder, ClientConfig, Params};
///
/// let client = ClientBuilder::new(ClientConfig::new("my-token"))
///     .with_cache_ttl(std::time::Duration::from_secs(600))
///     .build()?;
///
/// let rows = client
///     .query("stock_basic", Params::new().with("list_status", "L"), None)
///     .await?;
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    cache: Option<Arc<dyn CacheProvider>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http_client: None,
            cache: None,
        }
    }

    /// Replace the reqwest transport, e.g. with a scripted client in tests.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Use a custom cache provider. Supplying one enables caching.
    pub fn with_cache_provider(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.config.cache.enabled = true;
        self.cache = Some(cache);
        self
    }

    /// Enable the in-memory cache with the given TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.enabled = true;
        self.config.cache.ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Client, ConfigError> {
        self.config.validate()?;
        let ClientConfig {
            endpoint,
            token,
            timeout,
            retry,
            concurrency,
            cache,
        } = self.config;

        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let provider: Option<Arc<dyn CacheProvider>> = match self.cache {
            Some(provider) => Some(provider),
            None if cache.enabled => Some(Arc::new(InMemoryCache::new())),
            None => None,
        };

        Ok(Client {
            token,
            transport: Transport::new(http_client, endpoint, timeout),
            retry: RetryExecutor::new(retry),
            limiter: ConcurrencyLimiter::new(concurrency),
            cache: provider,
            cache_ttl: cache.ttl,
            namespace: cache.namespace,
        })
    }
}
