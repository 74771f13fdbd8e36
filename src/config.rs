use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelegramMode {
    /// Updates arrive over HTTP at `/telegram`
    #[default]
    Webhook,
    /// Updates are pulled from the Bot API with a teloxide dispatcher
    Polling,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    /// Without a token, Telegram replies are returned inline in the webhook response
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub mode: TelegramMode,
}

impl TelegramConfig {
    pub fn token(&self) -> Option<&str> {
        self.bot_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardLayout {
    #[default]
    RowPerButton,
    SingleRow,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResponseConfig {
    #[serde(default)]
    pub keyboard_layout: KeyboardLayout,
    /// Also emit the flat `fulfillmentText` field next to `fulfillmentMessages`
    #[serde(default = "default_true")]
    pub include_fulfillment_text: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            keyboard_layout: KeyboardLayout::default(),
            include_fulfillment_text: true,
        }
    }
}

/// A single outbound endpoint with its timeout and retry budget
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl EndpointConfig {
    fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_quote_endpoint")]
    pub quote: EndpointConfig,
    #[serde(default = "default_joke_endpoint")]
    pub joke: EndpointConfig,
    #[serde(default = "default_summary_endpoint")]
    pub summary: EndpointConfig,
    /// Ask the generative endpoint for a quote or joke when the dedicated API fails
    #[serde(default)]
    pub llm_fallback: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            quote: default_quote_endpoint(),
            joke: default_joke_endpoint(),
            summary: default_summary_endpoint(),
            llm_fallback: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerativeProvider {
    #[default]
    Huggingface,
    Openrouter,
}

impl std::fmt::Display for GenerativeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerativeProvider::Huggingface => write!(f, "huggingface"),
            GenerativeProvider::Openrouter => write!(f, "openrouter"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerativeConfig {
    #[serde(default)]
    pub provider: GenerativeProvider,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generative_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_generative_attempts")]
    pub max_attempts: u32,
    /// Upper bound on a single provider-reported "still loading" wait
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            provider: GenerativeProvider::default(),
            url: String::new(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_generative_timeout_ms(),
            max_attempts: default_generative_attempts(),
            max_wait_ms: default_max_wait_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl GenerativeConfig {
    /// Returns the effective url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        match self.provider {
            GenerativeProvider::Huggingface => {
                format!("https://api-inference.huggingface.co/models/{}", self.model)
            }
            GenerativeProvider::Openrouter => {
                "https://openrouter.ai/api/v1/chat/completions".to_string()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    1_000
}

fn default_quote_endpoint() -> EndpointConfig {
    EndpointConfig::with_url("https://zenquotes.io/api/random")
}

fn default_joke_endpoint() -> EndpointConfig {
    EndpointConfig::with_url("https://v2.jokeapi.dev/joke/Any?safe-mode&format=json")
}

fn default_summary_endpoint() -> EndpointConfig {
    EndpointConfig::with_url("https://en.wikipedia.org/api/rest_v1/page/summary")
}

fn default_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.2".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_generative_timeout_ms() -> u64 {
    15_000
}

fn default_generative_attempts() -> u32 {
    3
}

fn default_max_wait_ms() -> u64 {
    20_000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("mood_streaks.txt")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        for (name, endpoint) in [
            ("quote", &config.upstream.quote),
            ("joke", &config.upstream.joke),
            ("summary", &config.upstream.summary),
        ] {
            if endpoint.max_attempts == 0 {
                anyhow::bail!("upstream.{name}.max_attempts must be at least 1");
            }
        }
        if config.generative.max_attempts == 0 {
            anyhow::bail!("generative.max_attempts must be at least 1");
        }

        Ok(config)
    }
}
