pub mod generative;
pub mod http;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

pub use http::HttpUpstream;

pub const QUOTE_FALLBACK: &str =
    "\"Believe you can and you're halfway there.\" – Theodore Roosevelt";
pub const JOKE_FALLBACK: &str =
    "Why don't scientists trust atoms? Because they make up everything! 😄";
pub const SUMMARY_FALLBACK: &str = "I couldn't find any background on that right now.";
pub const GENERATIVE_FALLBACK: &str =
    "I'm unable to provide a response at the moment. Please try again later.";

/// Why an outbound call did not produce usable text
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("model is still loading")]
    Loading { estimated: Option<Duration> },
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::Loading { .. } => true,
            UpstreamError::Status(code) => *code >= 500,
            UpstreamError::Transport(_) | UpstreamError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::Status(status.as_u16())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Live,
    Fallback,
}

/// Text produced by an upstream call. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: Source,
}

impl Reply {
    pub fn live(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: Source::Live,
        }
    }

    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: Source::Fallback,
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == Source::Live
    }

    /// Collapse a call result into a reply, substituting `fallback` on any failure
    pub fn from_result(what: &str, result: Result<String, UpstreamError>, fallback: &str) -> Self {
        match result {
            Ok(text) if !text.trim().is_empty() => Reply::live(text.trim()),
            Ok(_) => {
                warn!("{} returned empty text, using fallback", what);
                Reply::fallback(fallback)
            }
            Err(e) => {
                warn!("{} call failed: {}", what, e);
                Reply::fallback(fallback)
            }
        }
    }
}

/// Bounded retry applied to every outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait between attempts when the provider gives no estimate
    pub backoff: Duration,
    /// Cap on provider-reported waits
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, err: &UpstreamError) -> Duration {
        match err {
            UpstreamError::Loading {
                estimated: Some(wait),
            } => (*wait).min(self.max_wait),
            _ => self.backoff,
        }
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.delay_for(&e);
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        what, attempt, self.max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// The external providers a handler may consult.
/// Implementations recover every failure to a fixed fallback text.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn quote(&self) -> Reply;
    async fn joke(&self) -> Reply;
    async fn summary(&self, topic: &str) -> Reply;
    async fn generate(&self, prompt: &str) -> Reply;
}
