//! Webhook HTTP surface.
//!
//! `POST /webhook` takes Dialogflow fulfillment requests, `POST /telegram`
//! takes raw Telegram updates, and either route accepts either shape. Every
//! conversational outcome is a 200; only bodies that are empty, not JSON or
//! of no known shape get a 400.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use serde_json::{json, Value};
use teloxide::Bot;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::compose::{Composer, OutboundPayload};
use crate::platform::{parse_inbound, telegram, Inbound, InboundRequest, RequestError};
use crate::router::Router;

// ── Shared state ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub router: Router,
    pub composer: Composer,
    pub include_fulfillment_text: bool,
    /// Set when a bot token is configured; Telegram replies are then sent
    /// through the Bot API instead of inline in the HTTP response.
    pub bot: Option<Bot>,
}

impl AppState {
    pub async fn respond(&self, request: &InboundRequest) -> OutboundPayload {
        let result = self.router.dispatch(request).await;
        let payload = self.composer.compose(&result, request.platform);
        debug!(
            "Reply: {} block(s), {} button(s)",
            payload.messages.len(),
            payload.buttons().len()
        );
        payload
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Routes ─────────────────────────────────────────────────────────────────────

pub fn app(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/webhook", post(webhook))
        .route("/telegram", post(webhook))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(bind: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    info!("Webhook server listening on {}", bind);

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, RequestError> {
    let span = info_span!("webhook", request_id = %Uuid::new_v4());

    async move {
        let inbound = parse_inbound(&body).inspect_err(|e| warn!("Rejected webhook body: {}", e))?;

        let request = inbound.request();
        info!(
            "Inbound request: intent={:?} session={} platform={:?}",
            request.intent_name, request.session_id, request.platform
        );

        match inbound {
            Inbound::Dialogflow(request) => {
                let payload = state.respond(&request).await;
                Ok(Json(payload.to_dialogflow(state.include_fulfillment_text)))
            }
            Inbound::Telegram { chat_id, request } => {
                let payload = state.respond(&request).await;
                match &state.bot {
                    Some(bot) => {
                        if let Err(e) = telegram::deliver(bot, chat_id, &payload).await {
                            error!("Failed to deliver reply to chat {}: {}", chat_id, e);
                        }
                        Ok(Json(json!({})))
                    }
                    None => Ok(Json(payload.to_telegram_method(chat_id))),
                }
            }
        }
    }
    .instrument(span)
    .await
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::DEFAULT_REPLY;
    use crate::router::test_support::{services, FakeUpstream};
    use crate::upstream::JOKE_FALLBACK;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(upstream: FakeUpstream) -> axum::Router {
        let (services, _) = services(upstream);
        app(Arc::new(AppState {
            router: Router::with_default_handlers(services),
            composer: Composer::default(),
            include_fulfillment_text: true,
            bot: None,
        }))
    }

    async fn post(app: axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app(FakeUpstream::live())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_dialogflow_motivation() {
        let body = json!({
            "session": "abc",
            "queryResult": {
                "queryText": "motivate me",
                "intent": { "displayName": "Get Motivation" }
            }
        });
        let (status, value) =
            post(test_app(FakeUpstream::live()), "/webhook", &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["fulfillmentText"], "\"Stay strong\" – Anon");
        let items = &value["fulfillmentMessages"][1]["payload"]["richContent"][0];
        assert_eq!(items[1]["text"], "🔄 Another Quote");
        assert_eq!(items[1]["event"]["parameters"]["callback_data"], "mb:motivation");
    }

    #[tokio::test]
    async fn test_dialogflow_from_telegram_gets_keyboard() {
        let body = json!({
            "session": "tg",
            "queryResult": { "queryText": "mb:menu", "intent": { "displayName": "Default Fallback Intent" } },
            "originalDetectIntentRequest": {
                "source": "telegram",
                "payload": { "data": { "callback_query": { "data": "mb:menu" } } }
            }
        });
        let (status, value) =
            post(test_app(FakeUpstream::live()), "/webhook", &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        let telegram = &value["fulfillmentMessages"][1];
        assert_eq!(telegram["platform"], "TELEGRAM");
        let keyboard = telegram["payload"]["telegram"]["reply_markup"]["inline_keyboard"]
            .as_array()
            .unwrap();
        assert_eq!(keyboard.len(), 5);
    }

    #[tokio::test]
    async fn test_raw_telegram_start() {
        let body = r#"{"update_id": 1, "message": {"chat": {"id": 42}, "text": "/start"}}"#;
        let (status, value) = post(test_app(FakeUpstream::live()), "/telegram", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["method"], "sendMessage");
        assert_eq!(value["chat_id"], 42);
        assert!(value["text"].as_str().unwrap().starts_with("Hi there!"));
        assert_eq!(
            value["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "mb:motivation"
        );
    }

    #[tokio::test]
    async fn test_joke_timeout_is_still_200() {
        let body = json!({
            "session": "abc",
            "queryResult": {
                "parameters": { "jokeType": "Joke" },
                "intent": { "displayName": "Cheer Up" }
            }
        });
        let (status, value) =
            post(test_app(FakeUpstream::failing()), "/webhook", &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["fulfillmentText"], JOKE_FALLBACK);
    }

    #[tokio::test]
    async fn test_malformed_request_gets_conversational_reply() {
        let (status, value) =
            post(test_app(FakeUpstream::live()), "/webhook", r#"{"queryResult": {}}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["fulfillmentText"], DEFAULT_REPLY);
    }

    #[tokio::test]
    async fn test_mistyped_dialogflow_fields_get_conversational_reply() {
        for body in [
            r#"{"session": null, "queryResult": {"queryText": "hi"}}"#,
            r#"{"session": "abc", "queryResult": {"queryText": 5}}"#,
            r#"{"session": "abc", "queryResult": {"parameters": null}}"#,
        ] {
            let (status, value) = post(test_app(FakeUpstream::live()), "/webhook", body).await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            assert_eq!(value["fulfillmentText"], DEFAULT_REPLY, "{}", body);
        }
    }

    #[tokio::test]
    async fn test_structurally_invalid_bodies_are_rejected() {
        for body in ["", "not json", r#"{"hello": "world"}"#] {
            let (status, value) = post(test_app(FakeUpstream::live()), "/webhook", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{:?}", body);
            assert!(value["error"].is_string());
        }
    }
}
