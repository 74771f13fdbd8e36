use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::generative::GenerativeClient;
use super::{
    Reply, RetryPolicy, Upstream, UpstreamError, GENERATIVE_FALLBACK, JOKE_FALLBACK,
    QUOTE_FALLBACK, SUMMARY_FALLBACK,
};
use crate::config::{EndpointConfig, GenerativeConfig, UpstreamConfig};

/// Quote payloads from the providers we know about
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuotePayload {
    /// ZenQuotes: `[{"q": "...", "a": "..."}]`
    ZenQuotes(Vec<ZenQuote>),
    /// Quotable: `{"content": "...", "author": "..."}`
    Quotable { content: String, author: String },
    Plain {
        quote: String,
        author: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ZenQuote {
    q: String,
    a: String,
}

/// JokeAPI (`joke` or `setup`/`delivery`) and official-joke-api (`setup`/`punchline`)
#[derive(Debug, Deserialize)]
struct JokePayload {
    #[serde(default)]
    error: bool,
    joke: Option<String>,
    setup: Option<String>,
    delivery: Option<String>,
    punchline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    extract: Option<String>,
}

pub fn format_quote(quote: &str, author: &str) -> String {
    let quote = quote.trim();
    let author = author.trim();
    if author.is_empty() {
        format!("\"{}\"", quote)
    } else {
        format!("\"{}\" – {}", quote, author)
    }
}

fn policy(endpoint: &EndpointConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: endpoint.max_attempts,
        backoff: Duration::from_millis(endpoint.backoff_ms),
        max_wait: Duration::from_millis(endpoint.backoff_ms),
    }
}

/// Live HTTP implementation of [`Upstream`]
pub struct HttpUpstream {
    client: reqwest::Client,
    config: UpstreamConfig,
    generative: GenerativeClient,
}

impl HttpUpstream {
    pub fn new(config: UpstreamConfig, generative: GenerativeConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            generative: GenerativeClient::new(client.clone(), generative),
            client,
            config,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        timeout: Duration,
    ) -> Result<T, UpstreamError> {
        debug!("GET {}", url);

        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Malformed(e.to_string())
            }
        })
    }

    async fn fetch_quote(&self) -> Result<String, UpstreamError> {
        let url = parse_url(&self.config.quote.url)?;
        let payload: QuotePayload = self.get_json(url, self.config.quote.timeout()).await?;

        match payload {
            QuotePayload::ZenQuotes(quotes) => quotes
                .into_iter()
                .next()
                .map(|q| format_quote(&q.q, &q.a))
                .ok_or_else(|| UpstreamError::Malformed("empty quote list".into())),
            QuotePayload::Quotable { content, author } => Ok(format_quote(&content, &author)),
            QuotePayload::Plain { quote, author } => {
                Ok(format_quote(&quote, author.as_deref().unwrap_or_default()))
            }
        }
    }

    async fn fetch_joke(&self) -> Result<String, UpstreamError> {
        let url = parse_url(&self.config.joke.url)?;
        let payload: JokePayload = self.get_json(url, self.config.joke.timeout()).await?;

        if payload.error {
            return Err(UpstreamError::Malformed("joke API reported an error".into()));
        }
        if let Some(joke) = payload.joke {
            return Ok(joke);
        }
        match (payload.setup, payload.delivery.or(payload.punchline)) {
            (Some(setup), Some(punchline)) => Ok(format!("{}\n{}", setup.trim(), punchline.trim())),
            _ => Err(UpstreamError::Malformed("missing joke fields".into())),
        }
    }

    async fn fetch_summary(&self, topic: &str) -> Result<String, UpstreamError> {
        let title = topic.split_whitespace().collect::<Vec<_>>().join("_");
        if title.is_empty() {
            return Err(UpstreamError::Malformed("empty topic".into()));
        }

        let mut url = parse_url(&self.config.summary.url)?;
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Transport("summary URL cannot take a path".into()))?
            .pop_if_empty()
            .push(&title);

        let payload: SummaryPayload = self.get_json(url, self.config.summary.timeout()).await?;
        payload
            .extract
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| UpstreamError::Malformed("missing extract".into()))
    }
}

fn parse_url(raw: &str) -> Result<reqwest::Url, UpstreamError> {
    reqwest::Url::parse(raw).map_err(|e| UpstreamError::Transport(format!("bad URL {}: {}", raw, e)))
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn quote(&self) -> Reply {
        let result = policy(&self.config.quote)
            .run("quote", || self.fetch_quote())
            .await;
        Reply::from_result("quote", result, QUOTE_FALLBACK)
    }

    async fn joke(&self) -> Reply {
        let result = policy(&self.config.joke)
            .run("joke", || self.fetch_joke())
            .await;
        Reply::from_result("joke", result, JOKE_FALLBACK)
    }

    async fn summary(&self, topic: &str) -> Reply {
        let result = policy(&self.config.summary)
            .run("summary", || self.fetch_summary(topic))
            .await;
        Reply::from_result("summary", result, SUMMARY_FALLBACK)
    }

    async fn generate(&self, prompt: &str) -> Reply {
        let result = self.generative.generate(prompt).await;
        Reply::from_result("generative", result, GENERATIVE_FALLBACK)
    }
}
