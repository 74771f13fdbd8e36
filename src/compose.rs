use serde_json::{json, Value};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::config::{KeyboardLayout, ResponseConfig};
use crate::platform::Platform;

/// Telegram rejects messages over 4096 characters; leave some headroom
pub const TELEGRAM_CHUNK_LEN: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Opaque callback data, echoed back verbatim when tapped
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// What a handler produces: plain text plus optional buttons
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandlerResult {
    pub text: String,
    pub buttons: Vec<Button>,
}

impl HandlerResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(text: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformBlock {
    Text(String),
    Telegram {
        text: String,
        keyboard: Vec<Vec<Button>>,
    },
    RichContent {
        text: String,
        buttons: Vec<Button>,
    },
}

impl PlatformBlock {
    /// Dialogflow `fulfillmentMessages` entry
    pub fn to_fulfillment_message(&self) -> Value {
        match self {
            PlatformBlock::Text(text) => json!({ "text": { "text": [text] } }),
            PlatformBlock::Telegram { text, keyboard } => json!({
                "platform": "TELEGRAM",
                "payload": {
                    "telegram": {
                        "text": text,
                        "reply_markup": inline_keyboard(keyboard),
                    }
                }
            }),
            PlatformBlock::RichContent { text, buttons } => {
                let mut items = vec![json!({ "type": "description", "text": [text] })];
                items.extend(buttons.iter().map(|b| {
                    json!({
                        "type": "button",
                        "text": b.label,
                        "event": {
                            "name": "",
                            "languageCode": "",
                            "parameters": { "callback_data": b.data }
                        }
                    })
                }));
                json!({ "payload": { "richContent": [items] } })
            }
        }
    }
}

pub fn inline_keyboard(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Ordered blocks for one reply; the generic text block always comes first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    pub messages: Vec<PlatformBlock>,
}

impl OutboundPayload {
    pub fn text(&self) -> &str {
        self.messages
            .iter()
            .find_map(|m| match m {
                PlatformBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Keyboard rows for chat delivery, if the reply carries any
    pub fn telegram_keyboard(&self) -> Option<&[Vec<Button>]> {
        self.messages.iter().find_map(|m| match m {
            PlatformBlock::Telegram { keyboard, .. } => Some(keyboard.as_slice()),
            _ => None,
        })
    }

    /// Every (label, data) pair reachable from any block
    pub fn buttons(&self) -> Vec<&Button> {
        let mut buttons = Vec::new();
        for message in &self.messages {
            match message {
                PlatformBlock::Text(_) => {}
                PlatformBlock::Telegram { keyboard, .. } => buttons.extend(keyboard.iter().flatten()),
                PlatformBlock::RichContent { buttons: items, .. } => buttons.extend(items.iter()),
            }
        }
        buttons
    }

    /// Dialogflow webhook response body
    pub fn to_dialogflow(&self, include_fulfillment_text: bool) -> Value {
        let messages: Vec<Value> = self
            .messages
            .iter()
            .map(PlatformBlock::to_fulfillment_message)
            .collect();
        let mut body = json!({ "fulfillmentMessages": messages });
        if include_fulfillment_text {
            body["fulfillmentText"] = Value::String(self.text().to_string());
        }
        body
    }

    /// Telegram webhook reply that asks the Bot API to send the message
    pub fn to_telegram_method(&self, chat_id: i64) -> Value {
        let mut body = json!({
            "method": "sendMessage",
            "chat_id": chat_id,
            "text": self.text(),
        });
        if let Some(keyboard) = self.telegram_keyboard() {
            body["reply_markup"] = json!(inline_keyboard(keyboard));
        }
        body
    }
}

/// Turns handler output into platform envelopes
#[derive(Debug, Clone, Copy, Default)]
pub struct Composer {
    layout: KeyboardLayout,
}

impl Composer {
    pub fn new(config: &ResponseConfig) -> Self {
        Self {
            layout: config.keyboard_layout,
        }
    }

    pub fn compose(&self, result: &HandlerResult, platform: Platform) -> OutboundPayload {
        let mut messages = vec![PlatformBlock::Text(result.text.clone())];

        if !result.buttons.is_empty() {
            match platform {
                Platform::Telegram => messages.push(PlatformBlock::Telegram {
                    text: result.text.clone(),
                    keyboard: self.rows(&result.buttons),
                }),
                Platform::Generic => messages.push(PlatformBlock::RichContent {
                    text: result.text.clone(),
                    buttons: result.buttons.clone(),
                }),
            }
        }

        OutboundPayload { messages }
    }

    fn rows(&self, buttons: &[Button]) -> Vec<Vec<Button>> {
        match self.layout {
            KeyboardLayout::RowPerButton => buttons.iter().map(|b| vec![b.clone()]).collect(),
            KeyboardLayout::SingleRow => vec![buttons.to_vec()],
        }
    }
}

/// Split long messages on newline or space boundaries
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
