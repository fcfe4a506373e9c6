//! HTTP fetcher implementation
//!
//! The orchestration engine only sees the [`Fetcher`] trait; this module
//! also provides the default reqwest-backed implementation. The fetcher owns
//! transport policy: per-request deadlines, the inter-request delay, and the
//! user-agent identity. Anything smarter (proxy rotation, robots policy) is
//! a drop-in replacement behind the same trait.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// A successfully fetched document
#[derive(Debug, Clone)]
pub struct Document {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Response body
    pub body: String,
}

/// A failed fetch, classified for the retry policy
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request deadline exceeded for {url}")]
    Timeout { url: String },

    #[error("connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("transport failure for {url}: {message}")]
    Other { url: String, message: String },
}

impl TransportError {
    /// The HTTP status, when the failure was a status response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Contract the scheduler dispatches fetches through
///
/// Implementations must treat an exceeded deadline exactly like any other
/// retryable transport failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, deadline: Duration) -> Result<Document, TransportError>;
}

/// Formats the user agent string: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn format_user_agent(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format_user_agent(config))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default reqwest-backed fetcher
///
/// Spaces out request starts by the configured delay and enforces the
/// per-request deadline. The pacing lock is held across the sleep, which is
/// what serializes starts when multiple fetch tasks race for it.
pub struct HttpFetcher {
    client: Client,
    request_delay: Duration,
    last_start: tokio::sync::Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(client: Client, request_delay: Duration) -> Self {
        Self {
            client,
            request_delay,
            last_start: tokio::sync::Mutex::new(None),
        }
    }

    async fn pace(&self) {
        if self.request_delay.is_zero() {
            return;
        }
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, deadline: Duration) -> Result<Document, TransportError> {
        self.pace().await;

        let response = self
            .client
            .get(url.clone())
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(TransportError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_error(url, e))?;

        Ok(Document {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

fn classify_error(url: &Url, error: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if error.is_timeout() {
        TransportError::Timeout { url }
    } else if error.is_connect() {
        TransportError::Connect {
            url,
            message: error.to_string(),
        }
    } else {
        TransportError::Other {
            url,
            message: error.to_string(),
        }
    }
}
