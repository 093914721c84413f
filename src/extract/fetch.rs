//! Document fetching for network-backed strategies.
//!
//! Strategies that read pages over HTTP go through the [`Fetcher`] trait so
//! tests can substitute an in-memory implementation. [`HttpFetcher`] is the
//! production implementation on top of `reqwest`, retrying transient
//! failures with exponential backoff.

use crate::constants::{HTTP_FETCH_ATTEMPTS, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// Retrieves the textual content of a URL.
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return its body.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Outcome of a single failed attempt, deciding whether to retry.
#[derive(Debug)]
enum AttemptError {
    /// Connection failures, timeouts and 5xx/429 responses.
    Transient(String),
    /// Anything a retry cannot fix, such as 404.
    Permanent(String),
}

impl AttemptError {
    const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn into_message(self) -> String {
        match self {
            Self::Transient(message) | Self::Permanent(message) => message,
        }
    }
}

/// [`Fetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    attempts: usize,
}

impl HttpFetcher {
    /// Create a fetcher sending `user_agent` with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            attempts: HTTP_FETCH_ATTEMPTS,
        })
    }

    /// Override the number of attempts per fetch (at least one).
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    async fn attempt(&self, url: &str) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {status}");
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    AttemptError::Transient(message)
                } else {
                    AttemptError::Permanent(message)
                },
            );
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(format!("failed to read body: {e}")))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
                .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
                .take(self.attempts.saturating_sub(1));

            debug!(target: "extract", "Fetching {}", url);
            RetryIf::start(
                strategy,
                || self.attempt(url),
                |error: &AttemptError| {
                    if error.is_transient() {
                        debug!(target: "extract", "Retrying {} after transient failure: {:?}", url, error);
                    }
                    error.is_transient()
                },
            )
            .await
            .map_err(|error| anyhow::anyhow!(error.into_message()))
            .with_context(|| format!("Failed to fetch {url}"))
        })
    }
}
