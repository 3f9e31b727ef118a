//! # Ferroshare Core
//!
//! Resilient client for the Tushare columnar financial data API.
//!
//! ## Overview
//!
//! Every endpoint of the API is reached through one generic call,
//! [`Client::query`], which runs the request through a pipeline:
//!
//! - **Cache** lookup keyed on endpoint and sorted parameters
//! - **Concurrency limiter** bounding in-flight calls and spacing their starts
//! - **Retry executor** with exponential backoff and `Retry-After` support
//! - **Transport** performing one timed HTTP POST and classifying failures
//! - **Transform** from `{fields, items}` into field-keyed rows
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache provider trait, in-memory cache, key generation |
//! | [`client`] | The request pipeline and its builder |
//! | [`config`] | Explicit client configuration |
//! | [`error`] | Error taxonomy and configuration errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`response`] | Scalars, rows, descriptors and the row transform |
//! | [`retry`] | Backoff and retry execution |
//! | [`throttling`] | Concurrency limiter |
//! | [`transport`] | Single-attempt wire exchange |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferroshare_core::{Client, ClientConfig, Params};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::from_env()?)?;
//!
//!     let params = Params::new().with("list_status", "L");
//!     let rows = client
//!         .query("stock_basic", params, Some(&["ts_code", "name"]))
//!         .await?;
//!
//!     for row in &rows {
//!         println!("{:?}", row.get("ts_code"));
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Failures surface as a single [`ApiError`] whose kind decides whether it was retried:
//!
//! ```rust
//! use ferroshare_core::{ApiError, ApiErrorKind};
//!
//! fn handle_error(error: ApiError) {
//!     match error.kind() {
//!         ApiErrorKind::Auth => {
//!             // Refresh the token
//!         }
//!         ApiErrorKind::RateLimit => {
//!             // Retries were exhausted; back off at a higher level
//!         }
//!         ApiErrorKind::Validation => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod response;
pub mod retry;
pub mod throttling;
pub mod transport;

// Caching
pub use cache::{generate_key, CacheMode, CacheProvider, InMemoryCache};

// Pipeline
pub use client::{Client, ClientBuilder};

// Configuration
pub use config::{CacheConfig, ClientConfig, DEFAULT_ENDPOINT};

// Error types
pub use error::{parse_retry_after, ApiError, ApiErrorKind, ConfigError};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Data model
pub use response::{transform, Params, RequestDescriptor, Row, Scalar, WirePayload, WireResponse};

// Retry logic
pub use retry::{Backoff, RetryConfig, RetryExecutor};

// Throttling
pub use throttling::{ConcurrencyConfig, ConcurrencyLimiter, ConcurrencySlot};

// Transport
pub use transport::Transport;
