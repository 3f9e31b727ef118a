//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;

/// Fraction of the computed delay used as the jitter window on either side.
const JITTER_RATIO: f64 = 0.2;

/// Wait schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `min(max, base * factor^attempt)`, optionally spread by `JITTER_RATIO` either way.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt`, counted from zero.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let raw = (base.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                let nominal = Duration::try_from_secs_f64(raw.max(0.0)).unwrap_or(max);
                if jitter {
                    spread(nominal)
                } else {
                    nominal
                }
            }
        }
    }
}

/// Uniform pick in `[d * (1 - JITTER_RATIO), d * (1 + JITTER_RATIO)]`, at millisecond grain.
fn spread(nominal: Duration) -> Duration {
    let millis = u64::try_from(nominal.as_millis()).unwrap_or(u64::MAX / 2);
    let window = (millis as f64 * JITTER_RATIO) as u64;
    let low = millis.saturating_sub(window);
    Duration::from_millis(fastrand::u64(low..=millis.saturating_add(window)))
}

/// Retry budget and wait schedule. A call makes at most `max_retries + 1` attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Default exponential schedule with a custom budget.
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Per-call bookkeeping; never shared between calls.
#[derive(Debug, Default)]
struct RetryState {
    attempts_made: u32,
    next_delay: Duration,
}

/// Re-runs an operation while it fails with a retryable [`ApiError`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or the retry
    /// budget is spent. The last error is returned unchanged.
    ///
    /// A server-provided `retry_after` replaces the computed backoff for that wait.
    pub async fn execute<T, F, Fut>(&self, mut operation: F, label: &str) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::default();

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.retryable() || state.attempts_made >= self.config.max_retries {
                return Err(error);
            }

            state.next_delay = error
                .retry_after()
                .unwrap_or_else(|| self.config.delay_for_attempt(state.attempts_made));

            tracing::warn!(
                label,
                attempt = state.attempts_made + 1,
                max_retries = self.config.max_retries,
                delay_ms = state.next_delay.as_millis() as u64,
                code = error.code(),
                error = %error.message(),
                "retrying after transient failure"
            );

            tokio::time::sleep(state.next_delay).await;
            state.attempts_made += 1;
        }
    }
}
