//! Remote source boundary.
//!
//! A remote source executes one call against a rate-limited upstream API and
//! returns one page of tabular rows plus a has-more indicator. Error
//! classification lives here so retry policy is defined once and used
//! uniformly by the fetch client and the batch processor.

use crate::Row;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod http;

/// Named call parameters, ordered for reproducible logs.
pub type Params = BTreeMap<String, String>;

/// One page of results from a remote call.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    /// Rows in this page.
    pub rows: Vec<Row>,
    /// Whether more pages remain.
    pub has_more: bool,
    /// Opaque cursor to pass back for the next page, when the source pages
    /// by cursor rather than by offset.
    pub next_cursor: Option<String>,
}

impl FetchPage {
    /// A terminal page carrying all remaining rows.
    pub fn last(rows: Vec<Row>) -> Self {
        Self {
            rows,
            has_more: false,
            next_cursor: None,
        }
    }

    /// An intermediate page with a continuation cursor.
    pub fn partial(rows: Vec<Row>, next_cursor: impl Into<String>) -> Self {
        Self {
            rows,
            has_more: true,
            next_cursor: Some(next_cursor.into()),
        }
    }
}

/// Retry class of a source error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying with backoff (timeouts, resets, 5xx).
    Transient,
    /// Retryable, but only after an extra cooldown: the remote says our
    /// configured pace is already too aggressive.
    Throttled,
    /// Retrying cannot change the outcome (auth failures, bad requests);
    /// aborts the run.
    NonRetryable,
    /// The payload itself is unusable (decode failures, predicate blowups);
    /// fails the batch without retry but does not abort the run.
    Data,
}

/// Errors raised by a remote call.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Request timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection-level failure (reset, refused, DNS).
    #[error("connection error: {0}")]
    Connection(String),

    /// Upstream server error (5xx).
    #[error("server error: {0}")]
    Server(String),

    /// Remote signalled rate-limit exceeded.
    #[error("rate limit exceeded: {0}")]
    Throttled(String),

    /// Invalid or revoked credentials / permission.
    #[error("authorization error: {0}")]
    Unauthorized(String),

    /// The request itself was rejected as malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl SourceError {
    /// Classify this error for retry handling.
    ///
    /// This is the single classification point used by both the fetch
    /// client and the batch processor.
    pub fn class(&self) -> ErrorClass {
        match self {
            SourceError::Timeout(_) | SourceError::Connection(_) | SourceError::Server(_) => {
                ErrorClass::Transient
            }
            SourceError::Throttled(_) => ErrorClass::Throttled,
            SourceError::Unauthorized(_) | SourceError::BadRequest(_) => ErrorClass::NonRetryable,
            SourceError::Decode(_) => ErrorClass::Data,
        }
    }
}

/// Result type for remote operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// One logical call against the upstream API.
///
/// Implementations execute exactly one page request; pagination, rate
/// limiting and retry are the fetch client's concern.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Execute one call.
    ///
    /// # Arguments
    /// * `endpoint` - Endpoint identifier (e.g. "daily", "fund_nav")
    /// * `params` - Call parameters, including any pagination cursor
    ///
    /// # Returns
    /// One page of rows and a has-more indicator.
    async fn call(&self, endpoint: &str, params: &Params) -> SourceResult<FetchPage>;
}
