use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RetryPolicy, UpstreamError};
use crate::config::{GenerativeConfig, GenerativeProvider};

// Hugging Face inference API

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Many(Vec<Generated>),
    One(Generated),
}

#[derive(Debug, Deserialize)]
struct InferenceError {
    #[serde(default)]
    error: String,
    estimated_time: Option<f64>,
}

// OpenAI-compatible chat completions (OpenRouter)

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Generative-text provider client. Retries while the provider reports the
/// model is still loading, sleeping the wait it estimates.
pub struct GenerativeClient {
    client: reqwest::Client,
    config: GenerativeConfig,
    url: String,
}

impl GenerativeClient {
    pub fn new(client: reqwest::Client, config: GenerativeConfig) -> Self {
        let url = config.effective_url();
        Self {
            client,
            config,
            url,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_attempts,
            backoff: Duration::from_millis(self.config.backoff_ms),
            max_wait: Duration::from_millis(self.config.max_wait_ms),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.policy()
            .run("generative", || self.attempt(prompt))
            .await
    }

    async fn attempt(&self, prompt: &str) -> Result<String, UpstreamError> {
        match self.config.provider {
            GenerativeProvider::Huggingface => self.huggingface(prompt).await,
            GenerativeProvider::Openrouter => self.openrouter(prompt).await,
        }
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(&self.url)
            .timeout(self.config.timeout())
            .header("Content-Type", "application/json");
        if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        }
    }

    async fn huggingface(&self, prompt: &str) -> Result<String, UpstreamError> {
        let request = InferenceRequest {
            inputs: prompt,
            parameters: InferenceParameters {
                max_new_tokens: self.config.max_tokens,
                return_full_text: false,
            },
        };

        debug!("Sending inference request to {}", self.url);

        let response = self.post().json(&request).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(loading_signal(&body).unwrap_or(UpstreamError::Status(status.as_u16())));
        }
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let parsed: InferenceResponse = response.json().await?;
        let generated = match parsed {
            InferenceResponse::Many(items) => items
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .ok_or_else(|| UpstreamError::Malformed("empty generation list".into()))?,
            InferenceResponse::One(g) => g.generated_text,
        };

        Ok(strip_echoed_prompt(&generated, prompt))
    }

    async fn openrouter(&self, prompt: &str) -> Result<String, UpstreamError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            max_tokens: self.config.max_tokens,
        };

        debug!("Sending chat request to {}", self.url);

        let response = self.post().json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Malformed("no completion content".into()))
    }
}

/// Interpret a 503 body as "model loading, retry after N seconds"
fn loading_signal(body: &str) -> Option<UpstreamError> {
    let parsed: InferenceError = serde_json::from_str(body).ok()?;
    if parsed.estimated_time.is_none() && !parsed.error.to_lowercase().contains("loading") {
        return None;
    }
    Some(UpstreamError::Loading {
        estimated: parsed
            .estimated_time
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
    })
}

fn strip_echoed_prompt(generated: &str, prompt: &str) -> String {
    generated
        .strip_prefix(prompt)
        .unwrap_or(generated)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::test_support::spawn_server;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(url: String, provider: GenerativeProvider, max_attempts: u32) -> GenerativeConfig {
        GenerativeConfig {
            provider,
            url,
            api_key: "secret".to_string(),
            max_attempts,
            backoff_ms: 0,
            max_wait_ms: 50,
            ..GenerativeConfig::default()
        }
    }

    /// Reports "loading" for the first `loading_for` calls, then answers
    async fn flaky_model(calls: Arc<AtomicU32>, loading_for: u32) -> String {
        let app = Router::new()
            .route(
                "/model",
                post(
                    |State((calls, loading_for)): State<(Arc<AtomicU32>, u32)>| async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < loading_for {
                            (
                                StatusCode::SERVICE_UNAVAILABLE,
                                Json(json!({
                                    "error": "Model is currently loading",
                                    "estimated_time": 0.01
                                })),
                            )
                                .into_response()
                        } else {
                            Json(json!([{ "generated_text": "You are doing great." }]))
                                .into_response()
                        }
                    },
                ),
            )
            .with_state((calls, loading_for));
        format!("{}/model", spawn_server(app).await)
    }

    #[test]
    fn test_strip_echoed_prompt() {
        assert_eq!(strip_echoed_prompt("Q: hi\nA: hello", "Q: hi\nA:"), "hello");
        assert_eq!(strip_echoed_prompt("  plain  ", "other"), "plain");
    }

    #[test]
    fn test_loading_signal_parsing() {
        let err = loading_signal(r#"{"error":"Model x is currently loading","estimated_time":20.5}"#);
        match err {
            Some(UpstreamError::Loading { estimated }) => {
                assert_eq!(estimated, Some(Duration::from_secs_f64(20.5)));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(loading_signal(r#"{"error":"Service overloaded"}"#).is_none());
        assert!(loading_signal("not json").is_none());
        assert!(matches!(
            loading_signal(r#"{"error":"loading","estimated_time":-1.0}"#),
            Some(UpstreamError::Loading { estimated: None })
        ));
    }

    #[tokio::test]
    async fn test_retries_while_model_loads() {
        let calls = Arc::new(AtomicU32::new(0));
        let url = flaky_model(calls.clone(), 2).await;
        let client = GenerativeClient::new(
            reqwest::Client::new(),
            config(url, GenerativeProvider::Huggingface, 3),
        );

        let text = client.generate("Say something kind.").await.unwrap();
        assert_eq!(text, "You are doing great.");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let url = flaky_model(calls.clone(), 10).await;
        let client = GenerativeClient::new(
            reqwest::Client::new(),
            config(url, GenerativeProvider::Huggingface, 2),
        );

        let err = client.generate("Say something kind.").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Loading { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_openrouter_chat_completion() {
        let app = Router::new().route(
            "/chat",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer secret")
                );
                assert_eq!(body["messages"][0]["role"], "user");
                Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Take a deep breath." } }]
                }))
            }),
        );
        let url = format!("{}/chat", spawn_server(app).await);
        let client = GenerativeClient::new(
            reqwest::Client::new(),
            config(url, GenerativeProvider::Openrouter, 1),
        );

        assert_eq!(client.generate("help").await.unwrap(), "Take a deep breath.");
    }

    #[tokio::test]
    async fn test_openrouter_without_choices_is_malformed() {
        let app = Router::new().route("/chat", post(|| async { Json(json!({ "choices": [] })) }));
        let url = format!("{}/chat", spawn_server(app).await);
        let client = GenerativeClient::new(
            reqwest::Client::new(),
            config(url, GenerativeProvider::Openrouter, 1),
        );

        assert!(matches!(
            client.generate("help").await,
            Err(UpstreamError::Malformed(_))
        ));
    }
}
