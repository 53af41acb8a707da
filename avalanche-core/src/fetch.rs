use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::{fmt::Debug, time::Duration};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::TransportError;

/// One GET request against a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), query: Vec::new() }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

/// Performs the raw network call for a query.
///
/// Implementations own retries and timeouts; whatever they give up on is
/// returned as a [`TransportError`].
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, TransportError> {
        let url = request.url.as_str();
        let started = Instant::now();
        debug!(url, params = ?request.query, "sending request");

        let res = self
            .http
            .get(url)
            .query(&request.query)
            .send()
            .await
            .map_err(|err| classify(url, &err))?;

        let status = res.status();
        let body = res.text().await.map_err(|err| TransportError::Body {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        trace!(
            url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "received response"
        );

        check_status(url, status.as_u16(), &body)?;

        serde_json::from_str(&body).map_err(|err| TransportError::Body {
            url: url.to_string(),
            message: format!("response is not JSON: {err}"),
        })
    }
}

fn classify(url: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout { url: url.to_string() }
    } else if err.is_connect() {
        TransportError::Offline { url: url.to_string(), message: err.to_string() }
    } else {
        TransportError::Request { url: url.to_string(), message: err.to_string() }
    }
}

fn check_status(url: &str, status: u16, body: &str) -> Result<(), TransportError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(TransportError::NotFound { url: url.to_string() }),
        _ => Err(TransportError::Status {
            url: url.to_string(),
            status,
            body: truncate_body(body),
        }),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
