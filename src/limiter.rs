//! Per-endpoint rate limiting.
//!
//! Implements a dual gate per remote endpoint: a concurrency cap on
//! simultaneously in-flight calls and a rolling-window throttle admitting at
//! most N calls per period. A call must hold both before it is issued.
//! Distinct endpoints never share a throttle budget, since some remote
//! interfaces are far more restricted than others (10/minute vs 500/minute).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::debug;

/// Per-endpoint throughput limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum simultaneously in-flight calls.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum calls admitted per rolling window.
    #[serde(default = "default_calls_per_period")]
    pub calls_per_period: usize,
    /// Length of the rolling window in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Maximum rows requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pause between consecutive pages of one call, in milliseconds.
    #[serde(default)]
    pub inter_page_delay_ms: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_calls_per_period() -> usize {
    120
}

fn default_period_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    1000
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            calls_per_period: default_calls_per_period(),
            period_secs: default_period_secs(),
            page_size: default_page_size(),
            inter_page_delay_ms: 0,
        }
    }
}

impl RateLimitPolicy {
    /// Rolling window length.
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Pause between consecutive pages.
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

/// Permit for one remote call.
///
/// Holds the concurrency slot for the lifetime of the call; dropping it
/// releases the slot. The throttle token is released separately once the
/// rolling window has elapsed.
#[derive(Debug)]
pub struct CallPermit {
    _slot: OwnedSemaphorePermit,
}

/// Dual concurrency/throttle gate for one endpoint.
pub struct RateLimiter {
    concurrency: Arc<Semaphore>,
    throttle: Arc<Semaphore>,
    window: Duration,
    cooldown: Duration,
}

impl RateLimiter {
    /// Create a limiter from a policy.
    pub fn new(policy: &RateLimitPolicy) -> Self {
        Self {
            concurrency: Arc::new(Semaphore::new(policy.max_concurrent.max(1))),
            throttle: Arc::new(Semaphore::new(policy.calls_per_period.max(1))),
            window: policy.period(),
            cooldown: policy.period(),
        }
    }

    /// Acquire a concurrency slot and a throttle token for one call.
    ///
    /// Blocks until both are available. The returned [`CallPermit`] must be
    /// held for the duration of the call. The throttle token is handed back
    /// by a spawned timer once the window elapses, so the admitted call rate
    /// never exceeds `calls_per_period` within any window. The slot is taken
    /// first: a call queued on the concurrency gate has not been admitted and
    /// must not burn throttle budget while it waits.
    pub async fn acquire(&self) -> Result<CallPermit, RateLimitError> {
        let slot = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::Acquire(e.to_string()))?;

        let token = self
            .throttle
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::Acquire(e.to_string()))?;

        // The token is consumed for a full window, not returned on call
        // completion. Dropping it after the sleep restores the budget.
        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(token);
        });

        Ok(CallPermit { _slot: slot })
    }

    /// Extra pause applied when the remote itself signals rate-limit
    /// exceeded.
    ///
    /// A remote-side throttle means the configured budget is already too
    /// aggressive, so this waits a full window on top of the regular retry
    /// backoff.
    pub async fn cooldown(&self) -> Duration {
        debug!("Remote throttle signalled; cooling down for {:?}", self.cooldown);
        sleep(self.cooldown).await;
        self.cooldown
    }
}

/// Rate limiter errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a permit (semaphore closed).
    #[error("failed to acquire rate limit permit: {0}")]
    Acquire(String),
}

/// Explicit registry of per-endpoint limiters.
///
/// One instance is created per process (or per run) and passed by reference
/// into the fetch client; there is no process-wide global. Limiters are
/// created lazily from the first policy seen for an endpoint and shared by
/// all workers afterwards.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the limiter for an endpoint, creating it from `policy` on first
    /// use.
    pub fn for_endpoint(&self, endpoint: &str, policy: &RateLimitPolicy) -> Arc<RateLimiter> {
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        limiters
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                debug!(
                    endpoint,
                    max_concurrent = policy.max_concurrent,
                    calls_per_period = policy.calls_per_period,
                    "Creating rate limiter"
                );
                Arc::new(RateLimiter::new(policy))
            })
            .clone()
    }

    /// Number of endpoints with a limiter.
    pub fn len(&self) -> usize {
        self.limiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether no limiter has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
