//! HTTP remote source adapter.
//!
//! Speaks a minimal JSON convention: `GET {base_url}/{endpoint}` with the
//! call parameters as query arguments, expecting a body of the form
//! `{"rows": [...], "has_more": bool, "next_cursor": "..."}` . Status codes
//! map onto the source error taxonomy; retry and pacing stay in the fetch
//! client.

use crate::remote::{FetchPage, Params, RemoteSource, SourceError, SourceResult};
use crate::Row;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire shape of a page response.
#[derive(Debug, Deserialize)]
struct PageBody {
    rows: Vec<Row>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// JSON-over-HTTP implementation of [`RemoteSource`].
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_status(status: StatusCode, body: String) -> SourceError {
        match status.as_u16() {
            401 | 403 => SourceError::Unauthorized(body),
            429 => SourceError::Throttled(body),
            s if status.is_server_error() => SourceError::Server(format!("{s}: {body}")),
            s => SourceError::BadRequest(format!("{s}: {body}")),
        }
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn call(&self, endpoint: &str, params: &Params) -> SourceResult<FetchPage> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, params = params.len(), "GET {url}");

        let response = self
            .client
            .get(&url)
            .query(&params.iter().collect::<Vec<_>>())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(e.to_string())
                } else {
                    SourceError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Self::map_status(status, body));
        }

        let body: PageBody = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        Ok(FetchPage {
            rows: body.rows,
            has_more: body.has_more,
            next_cursor: body.next_cursor,
        })
    }
}
