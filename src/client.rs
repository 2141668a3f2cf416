//! Paginated fetch client.
//!
//! Executes one logical call against the remote source: walks the has-more
//! cursor strictly in order, takes a rate limiter permit per page, pauses
//! `inter_page_delay` between pages, and retries each page under the
//! dataset's retry policy. Error classification is consulted once per
//! failure: transient errors back off and retry, remote throttling adds a
//! cooldown on top of the limiter's own pacing, and non-retryable errors
//! surface immediately since retrying cannot change the outcome and only
//! wastes quota.

use crate::limiter::{RateLimitError, RateLimitPolicy, RateLimiter, RateLimiterRegistry};
use crate::metrics;
use crate::remote::{ErrorClass, Params, RemoteSource, SourceError};
use crate::shutdown::SharedShutdown;
use crate::Row;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Upper bound on pages per logical call; guards against a cursor that never
/// terminates.
const MAX_PAGES: usize = 10_000;

/// Retry behaviour for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per page, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Multiplier applied per failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Cap on any single backoff delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Smaller attempt budget for the persist step.
    #[serde(default = "default_persist_attempts")]
    pub persist_attempts: u32,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_persist_attempts() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            persist_attempts: default_persist_attempts(),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff delay before retrying after `failed_attempts`
    /// failures, capped at `max_backoff_ms`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(failed_attempts.saturating_sub(1) as i32);
        let delay_ms = (self.backoff_base_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The source error that ended the call (after retries for retryable
    /// classes, immediately for the rest).
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Rate limiter failure.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Cancellation was requested before a page was issued.
    #[error("fetch cancelled")]
    Cancelled,

    /// Cursor walked past the page cap without terminating.
    #[error("pagination exceeded {0} pages; possible cursor loop")]
    PageLoop(usize),
}

impl FetchError {
    /// Classification of the underlying error, if any.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            FetchError::Source(e) => Some(e.class()),
            _ => None,
        }
    }
}

/// Executes paginated, rate-limited, retried calls.
pub struct FetchClient {
    source: Arc<dyn RemoteSource>,
    limiters: Arc<RateLimiterRegistry>,
    retry: RetryPolicy,
    shutdown: SharedShutdown,
}

impl FetchClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `source` - Remote source executing single calls
    /// * `limiters` - Shared per-endpoint limiter registry
    /// * `retry` - Retry policy applied per page
    /// * `shutdown` - Cooperative cancellation handle
    pub fn new(
        source: Arc<dyn RemoteSource>,
        limiters: Arc<RateLimiterRegistry>,
        retry: RetryPolicy,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            source,
            limiters,
            retry,
            shutdown,
        }
    }

    /// Fetch every page of one logical call.
    ///
    /// Pages are strictly sequential: page N+1 is requested only after page
    /// N completes, since the has-more cursor must be walked in order.
    /// Cancellation is checked before each page; a request already issued is
    /// allowed to finish.
    pub async fn fetch_all(
        &self,
        endpoint: &str,
        base_params: &Params,
        policy: &RateLimitPolicy,
    ) -> Result<Vec<Row>, FetchError> {
        let limiter = self.limiters.for_endpoint(endpoint, policy);
        let mut rows: Vec<Row> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if self.shutdown.is_shutdown_requested() {
                return Err(FetchError::Cancelled);
            }
            if pages >= MAX_PAGES {
                return Err(FetchError::PageLoop(MAX_PAGES));
            }

            let mut params = base_params.clone();
            params.insert("page_size".to_string(), policy.page_size.to_string());
            match &cursor {
                Some(token) => {
                    params.insert("page_token".to_string(), token.clone());
                }
                None if pages > 0 => {
                    // Cursor-less sources page by offset.
                    params.insert("offset".to_string(), rows.len().to_string());
                }
                None => {}
            }

            let page = self.call_with_retry(endpoint, &params, &limiter).await?;
            let page_len = page.rows.len();
            rows.extend(page.rows);
            pages += 1;
            debug!(endpoint, page = pages, rows = page_len, total = rows.len(), "Page fetched");

            if !page.has_more || page_len == 0 {
                break;
            }
            cursor = page.next_cursor;

            let delay = policy.inter_page_delay();
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }

        Ok(rows)
    }

    /// Execute one page request under the retry policy.
    async fn call_with_retry(
        &self,
        endpoint: &str,
        params: &Params,
        limiter: &Arc<RateLimiter>,
    ) -> Result<crate::remote::FetchPage, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let permit = limiter.acquire().await?;
            metrics::record_call(endpoint);

            let result = self.source.call(endpoint, params).await;
            // Release the concurrency slot before any backoff or cooldown
            // wait; a retrying call re-acquires on its next attempt.
            drop(permit);

            match result {
                Ok(page) => return Ok(page),
                Err(e) => match e.class() {
                    ErrorClass::Transient if attempt < self.retry.max_attempts => {
                        let backoff = self.retry.backoff(attempt);
                        warn!(
                            endpoint,
                            attempt,
                            max = self.retry.max_attempts,
                            "Transient error: {e}; retrying after {backoff:?}"
                        );
                        metrics::record_retry(endpoint);
                        sleep(backoff).await;
                    }
                    ErrorClass::Throttled if attempt < self.retry.max_attempts => {
                        warn!(
                            endpoint,
                            attempt,
                            max = self.retry.max_attempts,
                            "Remote throttled: {e}; applying cooldown"
                        );
                        metrics::record_throttle(endpoint);
                        metrics::record_retry(endpoint);
                        limiter.cooldown().await;
                        sleep(self.retry.backoff(attempt)).await;
                    }
                    ErrorClass::NonRetryable => {
                        warn!(endpoint, "Non-retryable error: {e}; not retrying");
                        return Err(FetchError::Source(e));
                    }
                    ErrorClass::Data => {
                        warn!(endpoint, "Data error: {e}; failing batch without retry");
                        return Err(FetchError::Source(e));
                    }
                    _ => {
                        warn!(
                            endpoint,
                            attempt, "Retries exhausted: {e}"
                        );
                        return Err(FetchError::Source(e));
                    }
                },
            }
        }
    }
}
