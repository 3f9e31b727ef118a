//! Error taxonomy for API calls and client construction.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::http_client::{HttpError, HttpErrorKind};

/// Closed classification of every failure the pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    Auth,
    RateLimit,
    Network,
    Server,
    Validation,
    Timeout,
    Unknown,
}

impl ApiErrorKind {
    /// Maps an HTTP status to a kind. Statuses outside the known set are `Unknown`.
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            400 => Self::Validation,
            500 | 502 | 503 | 504 => Self::Server,
            _ => Self::Unknown,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Server | Self::Timeout
        )
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Auth => "api.auth",
            Self::RateLimit => "api.rate_limit",
            Self::Network => "api.network",
            Self::Server => "api.server",
            Self::Validation => "api.validation",
            Self::Timeout => "api.timeout",
            Self::Unknown => "api.unknown",
        }
    }
}

impl Display for ApiErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured error returned by every pipeline stage.
///
/// Whether an error is retryable is a property of its [`ApiErrorKind`] alone.
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ApiErrorKind,
    message: String,
    http_status: Option<u16>,
    retry_after: Option<Duration>,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            retry_after: None,
            cause: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Auth, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::RateLimit, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Server, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unknown, message)
    }

    /// Classifies a non-2xx HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            http_status: Some(status),
            ..Self::new(ApiErrorKind::from_status(status), message)
        }
    }

    /// A 2xx response whose envelope carries a non-zero business code.
    pub fn business(status: u16, code: i64, message: Option<String>) -> Self {
        let message = message
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or_else(|| format!("request rejected with business code {code}"));
        Self {
            http_status: Some(status),
            ..Self::validation(message)
        }
    }

    /// Attaches a server-suggested delay before the next attempt.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub const fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<HttpError> for ApiError {
    fn from(error: HttpError) -> Self {
        let kind = match error.kind() {
            HttpErrorKind::Timeout => ApiErrorKind::Timeout,
            HttpErrorKind::Connect | HttpErrorKind::Other => ApiErrorKind::Network,
        };
        Self::new(kind, error.message().to_owned()).with_cause(error)
    }
}

/// Decodes a `Retry-After` header value in delta-seconds or HTTP-date form.
///
/// Dates in the past resolve to a zero delay.
pub fn parse_retry_after(value: &str, now: OffsetDateTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let target = PrimitiveDateTime::parse(value, &format).ok()?.assume_utc();
    Some(Duration::try_from(target - now).unwrap_or(Duration::ZERO))
}

/// Client construction errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("api token cannot be empty")]
    EmptyToken,
    #[error("endpoint url cannot be empty")]
    EmptyEndpoint,
    #[error("max_concurrent must be greater than zero")]
    ZeroConcurrency,
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("backoff factor must be finite and >= 1.0, got {factor}")]
    InvalidBackoffFactor { factor: f64 },
    #[error("cache namespace cannot be empty")]
    EmptyCacheNamespace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn status_classification_follows_taxonomy() {
        assert_eq!(ApiErrorKind::from_status(401), ApiErrorKind::Auth);
        assert_eq!(ApiErrorKind::from_status(403), ApiErrorKind::Auth);
        assert_eq!(ApiErrorKind::from_status(429), ApiErrorKind::RateLimit);
        assert_eq!(ApiErrorKind::from_status(400), ApiErrorKind::Validation);
        for status in [500, 502, 503, 504] {
            assert_eq!(ApiErrorKind::from_status(status), ApiErrorKind::Server);
        }
        assert_eq!(ApiErrorKind::from_status(404), ApiErrorKind::Unknown);
        assert_eq!(ApiErrorKind::from_status(501), ApiErrorKind::Unknown);
    }

    #[test]
    fn retryable_is_derived_from_kind() {
        assert!(!ApiError::auth("bad token").retryable());
        assert!(!ApiError::validation("bad param").retryable());
        assert!(!ApiError::unknown("odd").retryable());
        assert!(ApiError::rate_limited("slow down").retryable());
        assert!(ApiError::server("boom").retryable());
        assert!(ApiError::timeout("late").retryable());
        assert!(ApiError::network("dns").retryable());
    }

    #[test]
    fn business_error_keeps_server_message() {
        let error = ApiError::business(200, 40203, Some(String::from("no permission")));

        assert_eq!(error.kind(), ApiErrorKind::Validation);
        assert_eq!(error.message(), "no permission");
        assert_eq!(error.http_status(), Some(200));
        assert_eq!(error.to_string(), "no permission (api.validation)");
    }

    #[test]
    fn business_error_without_message_mentions_code() {
        let error = ApiError::business(200, -1, None);
        assert!(error.message().contains("-1"));
    }

    #[test]
    fn http_errors_map_to_timeout_or_network() {
        let timeout: ApiError = HttpError::timeout("request timeout").into();
        assert_eq!(timeout.kind(), ApiErrorKind::Timeout);
        assert!(timeout.source().is_some());

        let connect: ApiError = HttpError::connect("connection refused").into();
        assert_eq!(connect.kind(), ApiErrorKind::Network);

        let other: ApiError = HttpError::new("dns failure").into();
        assert_eq!(other.kind(), ApiErrorKind::Network);
    }

    #[test]
    fn retry_after_seconds_form() {
        let now = datetime!(2024-01-01 00:00:00 UTC);
        assert_eq!(parse_retry_after("3", now), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 0 ", now), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_http_date_form() {
        let now = datetime!(2015-10-21 07:27:50 UTC);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn retry_after_date_in_past_is_zero() {
        let now = datetime!(2015-10-21 08:00:00 UTC);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn retry_after_garbage_is_ignored() {
        let now = datetime!(2024-01-01 00:00:00 UTC);
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("-5", now), None);
    }
}
