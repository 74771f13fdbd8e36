use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use teloxide::prelude::*;
use tracing::{info, warn};

use super::{lenient, InboundRequest, Platform};
use crate::compose::{inline_keyboard, split_message, OutboundPayload, TELEGRAM_CHUNK_LEN};
use crate::server::AppState;

/// Raw Telegram update as posted to a bot webhook.
/// Only the fields routing needs are read; mistyped optional fields read as absent.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<UpdateMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub callback_query: Option<UpdateCallback>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessage {
    pub chat: UpdateChat,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCallback {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<UpdateMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub from: Option<UpdateUser>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub id: i64,
}

impl TelegramUpdate {
    /// The chat to answer and the normalized request, if the update is routable
    pub fn into_request(self) -> Option<(i64, InboundRequest)> {
        if let Some(callback) = self.callback_query {
            let chat_id = reply_chat(
                callback.message.map(|m| m.chat.id),
                callback.from.map(|u| u.id),
            )?;
            return Some((chat_id, callback_request(chat_id, callback.data.as_deref()?)));
        }

        let message = self.message?;
        let text = message.text.unwrap_or_default();
        Some((message.chat.id, message_request(message.chat.id, &text)))
    }
}

/// Where a button tap is answered: the chat holding the keyboard, else the
/// private chat with whoever tapped it
pub fn reply_chat(message_chat: Option<i64>, sender: Option<i64>) -> Option<i64> {
    message_chat.or(sender)
}

pub fn session_id(chat_id: i64) -> String {
    format!("telegram:{}", chat_id)
}

pub fn message_request(chat_id: i64, text: &str) -> InboundRequest {
    InboundRequest::new(session_id(chat_id), Platform::Telegram).with_utterance(text)
}

pub fn callback_request(chat_id: i64, data: &str) -> InboundRequest {
    InboundRequest::new(session_id(chat_id), Platform::Telegram).with_callback(data)
}

/// Send a reply through the Bot API, splitting long text.
/// The keyboard rides on the last chunk.
pub async fn deliver(bot: &Bot, chat_id: i64, payload: &OutboundPayload) -> ResponseResult<()> {
    let chunks = split_message(payload.text(), TELEGRAM_CHUNK_LEN);
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.into_iter().enumerate() {
        let request = bot.send_message(ChatId(chat_id), chunk);
        match payload.telegram_keyboard() {
            Some(keyboard) if i == last => {
                request.reply_markup(inline_keyboard(keyboard)).await?;
            }
            _ => {
                request.await?;
            }
        }
    }

    Ok(())
}

/// Pull updates from the Bot API instead of receiving them over HTTP
pub async fn run_polling(state: Arc<AppState>, bot: Bot) -> Result<()> {
    info!("Starting Telegram long polling...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };

    info!("Telegram message in chat {}: {}", msg.chat.id.0, text);

    bot.send_chat_action(msg.chat.id, teloxide::types::ChatAction::Typing)
        .await
        .ok();

    let request = message_request(msg.chat.id.0, &text);
    let payload = state.respond(&request).await;
    deliver(&bot, msg.chat.id.0, &payload).await
}

async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Stop the client-side spinner whatever happens next
    bot.answer_callback_query(query.id.clone()).await.ok();

    let data = match query.data.as_deref() {
        Some(d) => d,
        None => return Ok(()),
    };
    let Some(chat_id) = reply_chat(
        query.message.as_ref().map(|m| m.chat().id.0),
        Some(ChatId::from(query.from.id).0),
    ) else {
        return Ok(());
    };

    info!("Telegram callback in chat {}: {}", chat_id, data);

    let request = callback_request(chat_id, data);
    let payload = state.respond(&request).await;
    deliver(&bot, chat_id, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(body: serde_json::Value) -> Option<(i64, InboundRequest)> {
        serde_json::from_value::<TelegramUpdate>(body)
            .unwrap()
            .into_request()
    }

    #[test]
    fn test_start_command_message() {
        let (chat_id, request) = update(json!({
            "update_id": 1,
            "message": { "message_id": 3, "chat": { "id": 12345, "type": "private" }, "text": "/start" }
        }))
        .unwrap();

        assert_eq!(chat_id, 12345);
        assert_eq!(request.session_id, "telegram:12345");
        assert_eq!(request.utterance, "/start");
        assert_eq!(request.intent_name, "");
        assert_eq!(request.platform, Platform::Telegram);
    }

    #[test]
    fn test_callback_query_uses_message_chat() {
        let (chat_id, request) = update(json!({
            "callback_query": {
                "id": "cb-1",
                "data": "mb:coping:sleep",
                "from": { "id": 1 },
                "message": { "chat": { "id": -100200 } }
            }
        }))
        .unwrap();

        assert_eq!(chat_id, -100200);
        assert_eq!(request.callback_data.as_deref(), Some("mb:coping:sleep"));
        assert_eq!(request.utterance, "");
    }

    #[test]
    fn test_callback_query_falls_back_to_sender() {
        let (chat_id, _) = update(json!({
            "callback_query": { "data": "mb:menu", "from": { "id": 77 } }
        }))
        .unwrap();
        assert_eq!(chat_id, 77);
    }

    #[test]
    fn test_group_button_is_answered_in_the_group() {
        assert_eq!(reply_chat(Some(-100200), Some(1)), Some(-100200));
        assert_eq!(reply_chat(None, Some(1)), Some(1));
        assert_eq!(reply_chat(None, None), None);

        let (chat_id, request) = update(json!({
            "callback_query": {
                "data": "mb:motivation",
                "from": { "id": 1 },
                "message": { "chat": { "id": -100200, "type": "supergroup" } }
            }
        }))
        .unwrap();
        assert_eq!(chat_id, -100200);
        assert_eq!(request.session_id, session_id(-100200));
    }

    #[test]
    fn test_mistyped_text_routes_as_blank() {
        let (chat_id, request) = update(json!({
            "message": { "chat": { "id": 9 }, "text": { "oops": true } }
        }))
        .unwrap();
        assert_eq!(chat_id, 9);
        assert!(request.is_blank());
    }

    #[test]
    fn test_callback_without_data_is_not_routable() {
        assert!(update(json!({ "callback_query": { "from": { "id": 77 } } })).is_none());
    }

    #[test]
    fn test_non_text_message_routes_as_blank() {
        let (_, request) = update(json!({
            "message": { "chat": { "id": 9 }, "sticker": { "file_id": "x" } }
        }))
        .unwrap();
        assert!(request.is_blank());
    }
}
