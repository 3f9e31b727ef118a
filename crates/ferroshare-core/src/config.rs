use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::{Backoff, RetryConfig};
use crate::throttling::ConcurrencyConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.tushare.pro";

/// Response cache settings. Caching is off unless `enabled` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(3_600),
            namespace: String::from("tushare"),
        }
    }
}

impl CacheConfig {
    pub fn enabled(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            ..Self::default()
        }
    }
}

/// Explicit client configuration. Nothing is read from the environment implicitly.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub token: String,
    /// Hard limit for a single transport attempt.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from(DEFAULT_ENDPOINT),
            token: String::new(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("concurrency", &self.concurrency)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Reads the token from `TUSHARE_TOKEN` and an optional endpoint override from
    /// `TUSHARE_API_URL`. Every other setting keeps its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("TUSHARE_TOKEN").map_err(|_| ConfigError::EmptyToken)?;
        let endpoint = env::var("TUSHARE_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_ENDPOINT));

        let config = Self {
            endpoint,
            ..Self::new(token)
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.concurrency.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if let Backoff::Exponential { factor, .. } = self.retry.backoff {
            if !factor.is_finite() || factor < 1.0 {
                return Err(ConfigError::InvalidBackoffFactor { factor });
            }
        }
        if self.cache.enabled && self.cache.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyCacheNamespace);
        }
        Ok(())
    }
}
