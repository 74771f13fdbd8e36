pub mod dialogflow;
pub mod telegram;

use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use serde_json::{Map, Value};

/// Session key used when the caller supplies none
pub const ANONYMOUS_SESSION: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Generic,
    Telegram,
}

/// A normalized request from any platform
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboundRequest {
    /// Intent display name resolved by the NLU platform (may be empty)
    pub intent_name: String,
    /// What the user typed or said
    pub utterance: String,
    pub session_id: String,
    /// Data of the button the user tapped
    pub callback_data: Option<String>,
    pub platform: Platform,
    /// Slot values the NLU platform already resolved
    pub parameters: Map<String, Value>,
}

impl InboundRequest {
    pub fn new(session_id: impl Into<String>, platform: Platform) -> Self {
        let session_id = session_id.into();
        Self {
            session_id: if session_id.trim().is_empty() {
                ANONYMOUS_SESSION.to_string()
            } else {
                session_id
            },
            platform,
            ..Self::default()
        }
    }

    pub fn with_intent(mut self, intent_name: impl Into<String>) -> Self {
        self.intent_name = intent_name.into();
        self
    }

    pub fn with_utterance(mut self, utterance: impl Into<String>) -> Self {
        self.utterance = utterance.into();
        self
    }

    pub fn with_callback(mut self, data: impl Into<String>) -> Self {
        self.callback_data = Some(data.into());
        self
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// First non-empty string value among the given parameter names.
    /// List-valued slots yield their first string element.
    pub fn param(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| {
            let value = match self.parameters.get(*name)? {
                Value::Array(items) => items.first()?,
                other => other,
            };
            value.as_str().map(str::trim).filter(|s| !s.is_empty())
        })
    }

    /// Nothing to route on at all
    pub fn is_blank(&self) -> bool {
        self.intent_name.trim().is_empty()
            && self.utterance.trim().is_empty()
            && self
                .callback_data
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
    }
}

/// Read a field, falling back to its default when it is null or of the wrong type
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Structurally invalid webhook bodies; everything else gets a conversational reply
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request body is empty")]
    EmptyBody,
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request body matches no known webhook shape")]
    UnknownShape,
}

/// A parsed webhook body
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Dialogflow(InboundRequest),
    /// Sent straight from Telegram; the reply goes back to `chat_id`
    Telegram {
        chat_id: i64,
        request: InboundRequest,
    },
}

impl Inbound {
    pub fn request(&self) -> &InboundRequest {
        match self {
            Inbound::Dialogflow(request) => request,
            Inbound::Telegram { request, .. } => request,
        }
    }
}

pub fn parse_inbound(body: &[u8]) -> Result<Inbound, RequestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RequestError::EmptyBody);
    }
    let value: Value = serde_json::from_slice(body)?;
    let object = value.as_object().ok_or(RequestError::UnknownShape)?;
    let from_dialogflow = object.contains_key("queryResult");
    let from_telegram = object.contains_key("message") || object.contains_key("callback_query");

    if from_dialogflow {
        let webhook: dialogflow::WebhookRequest = serde_json::from_value(value)?;
        return Ok(Inbound::Dialogflow(webhook.into_request()));
    }
    if from_telegram {
        let update: telegram::TelegramUpdate = serde_json::from_value(value)?;
        let (chat_id, request) = update.into_request().ok_or(RequestError::UnknownShape)?;
        return Ok(Inbound::Telegram { chat_id, request });
    }

    Err(RequestError::UnknownShape)
}
