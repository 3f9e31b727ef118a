//! Response caching: the provider contract, the in-memory default and key generation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::response::{Params, Row, Scalar};

/// Defines the behavior of the cache for an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, fetch from the network and write the response to the cache. (Default)
    #[default]
    Use,
    /// Always fetch from the network, bypassing any cached entry,
    /// and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Self::Use | Self::Refresh)
    }
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key/value store for transformed rows with per-entry expiry.
///
/// Implementations may be remote; every operation is asynchronous. An entry must never be
/// returned once its TTL has elapsed.
pub trait CacheProvider: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<Row>>>;

    fn set<'a>(&'a self, key: &'a str, rows: Vec<Row>, ttl: Duration) -> CacheFuture<'a, ()>;

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;

    fn clear<'a>(&'a self) -> CacheFuture<'a, ()>;
}

/// Builds the canonical key `<namespace>:<endpoint>[:<k1>=<v1>&<k2>=<v2>...]`.
///
/// Parameters are emitted in ascending name order, so insertion order never matters.
/// Names and text values are percent-encoded, so `&`, `=` and `:` inside them cannot forge
/// another parameter. Non-text values carry a `!` prefix, which encoded text never
/// contains, so `1` and `"1"` get different keys.
pub fn generate_key(namespace: &str, endpoint: &str, params: &Params) -> String {
    let mut key = format!("{namespace}:{endpoint}");
    if params.is_empty() {
        return key;
    }

    let query = params
        .iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), key_value(value)))
        .collect::<Vec<_>>()
        .join("&");
    key.push(':');
    key.push_str(&query);
    key
}

fn key_value(value: &Scalar) -> String {
    match value {
        Scalar::Text(text) => urlencoding::encode(text).into_owned(),
        // Debug keeps the fraction, so 1.0 stays apart from the integer 1.
        Scalar::Float(number) => format!("!{number:?}"),
        other => format!("!{other}"),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    rows: Vec<Row>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

enum Lookup {
    Hit(Vec<Row>),
    Expired,
    Missing,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
}

impl CacheInner {
    fn get(&self, key: &str, now: Instant) -> Lookup {
        match self.map.get(key) {
            Some(entry) if entry.is_live(now) => Lookup::Hit(entry.rows.clone()),
            Some(_) => Lookup::Expired,
            None => Lookup::Missing,
        }
    }

    fn put(&mut self, key: String, rows: Vec<Row>, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        self.map.insert(key, CacheEntry { rows, expires_at });
    }

    fn remove_if_expired(&mut self, key: &str, now: Instant) {
        if self.map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.map.remove(key);
        }
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.is_live(now));
    }
}

/// Thread-safe in-memory cache. Expired entries are evicted lazily when read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries from the cache.
    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    /// Get the number of entries in the cache (including expired entries).
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CacheProvider for InMemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<Row>>> {
        Box::pin(async move {
            let now = Instant::now();
            let lookup = {
                let store = self.inner.read().await;
                store.get(key, now)
            };

            match lookup {
                Lookup::Hit(rows) => Some(rows),
                Lookup::Expired => {
                    let mut store = self.inner.write().await;
                    store.remove_if_expired(key, now);
                    None
                }
                Lookup::Missing => None,
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, rows: Vec<Row>, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.put(key.to_owned(), rows, ttl);
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.map.remove(key);
        })
    }

    fn clear<'a>(&'a self) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.map.clear();
        })
    }
}
