use serde::Deserialize;
use serde_json::{Map, Value};

use super::{lenient, InboundRequest, Platform};

/// The parts of a Dialogflow ES webhook request we read.
/// A null or mistyped field reads as its default.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub session: String,
    #[serde(default, deserialize_with = "lenient")]
    pub query_result: QueryResult,
    #[serde(default, deserialize_with = "lenient")]
    pub original_detect_intent_request: Option<OriginalDetectIntentRequest>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default, deserialize_with = "lenient")]
    pub query_text: String,
    #[serde(default, deserialize_with = "lenient")]
    pub parameters: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub intent: Option<IntentRef>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntentRef {
    #[serde(default, deserialize_with = "lenient")]
    pub display_name: String,
}

/// Envelope of the request the integration (e.g. Telegram) sent to Dialogflow
#[derive(Debug, Deserialize, Default)]
pub struct OriginalDetectIntentRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub payload: Value,
}

impl WebhookRequest {
    fn platform(&self) -> Platform {
        let Some(original) = &self.original_detect_intent_request else {
            return Platform::Generic;
        };
        let from_source = original
            .source
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("telegram"));
        let from_payload = original.payload.pointer("/data/callback_query").is_some()
            || original.payload.pointer("/data/message/chat").is_some();

        if from_source || from_payload {
            Platform::Telegram
        } else {
            Platform::Generic
        }
    }

    /// Button echo: Telegram callback query first, then the rich-content event parameter
    fn callback_data(&self) -> Option<String> {
        self.original_detect_intent_request
            .as_ref()
            .and_then(|o| o.payload.pointer("/data/callback_query/data"))
            .and_then(Value::as_str)
            .or_else(|| {
                self.query_result
                    .parameters
                    .get("callback_data")
                    .and_then(Value::as_str)
            })
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }

    pub fn into_request(self) -> InboundRequest {
        let platform = self.platform();
        let callback_data = self.callback_data();
        let intent_name = self
            .query_result
            .intent
            .map(|i| i.display_name)
            .unwrap_or_default();

        let mut request = InboundRequest::new(self.session, platform)
            .with_intent(intent_name)
            .with_utterance(self.query_result.query_text);
        request.callback_data = callback_data;
        request.parameters = self.query_result.parameters;
        request
    }
}
