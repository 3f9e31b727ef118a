use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::ApiError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Admission limits for outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Upper bound on operations running at once.
    pub max_concurrent: usize,
    /// Minimum spacing between two consecutive operation starts. Zero disables spacing.
    pub min_interval: Duration,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_interval: Duration::from_millis(200),
        }
    }
}

/// Right to run one operation. The slot returns to the pool when dropped.
#[derive(Debug)]
pub struct ConcurrencySlot {
    _permit: OwnedSemaphorePermit,
}

struct StartSpacing {
    limiter: DirectRateLimiter,
    turn: Mutex<()>,
}

/// Bounds in-flight operations and spaces their starts.
///
/// Waiters are admitted in FIFO order: both the slot semaphore and the spacing lock are fair.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    spacing: Option<Arc<StartSpacing>>,
}

impl ConcurrencyLimiter {
    pub fn new(config: ConcurrencyConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        let spacing = Quota::with_period(config.min_interval).map(|quota| {
            Arc::new(StartSpacing {
                limiter: RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)),
                turn: Mutex::new(()),
            })
        });

        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            spacing,
        }
    }

    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.slots.available_permits()
    }

    /// Waits for a free slot, then for the start spacing to elapse.
    pub async fn acquire(&self) -> Result<ConcurrencySlot, ApiError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| ApiError::unknown("concurrency limiter is closed").with_cause(e))?;

        if let Some(spacing) = &self.spacing {
            let _turn = spacing.turn.lock().await;
            if spacing.limiter.check().is_err() {
                tracing::debug!(
                    in_flight = self.in_flight(),
                    "delaying start to respect minimum interval"
                );
                spacing.limiter.until_ready().await;
            }
        }

        Ok(ConcurrencySlot { _permit: permit })
    }

    /// Runs `operation` while holding a slot. The slot is released on success, on error,
    /// and when the returned future is dropped.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _slot = self.acquire().await?;
        operation().await
    }
}
