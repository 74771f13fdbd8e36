use anyhow::Result;
use async_trait::async_trait;

use super::{label_key, menu_button, pick_choice};
use crate::compose::{Button, HandlerResult};
use crate::intent::CallbackToken;
use crate::platform::InboundRequest;
use crate::router::{IntentHandler, Services};

const JOKE_PROMPT: &str = "Tell me a funny joke.";

pub const PUN: &str = "I used to be a banker, but I lost interest. 😏";
pub const KNOCK_KNOCK: &str =
    "Knock, knock.\nWho's there?\nLettuce.\nLettuce who?\nLettuce in, it's cold out here! 🚪";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JokeKind {
    Joke,
    Pun,
    KnockKnock,
}

impl JokeKind {
    pub const ALL: [JokeKind; 3] = [JokeKind::Joke, JokeKind::Pun, JokeKind::KnockKnock];

    pub fn slug(self) -> &'static str {
        match self {
            JokeKind::Joke => "joke",
            JokeKind::Pun => "pun",
            JokeKind::KnockKnock => "knock-knock",
        }
    }

    pub fn from_slug(slug: &str) -> Option<JokeKind> {
        JokeKind::ALL.into_iter().find(|k| k.slug() == slug)
    }

    pub fn label(self) -> &'static str {
        match self {
            JokeKind::Joke => "🤣 Joke",
            JokeKind::Pun => "😏 Pun",
            JokeKind::KnockKnock => "🚪 Knock-knock",
        }
    }

    /// Slot values, legacy button data and typed text such as "Pun"
    pub fn from_label(text: &str) -> Option<JokeKind> {
        match label_key(text).as_str() {
            "joke" | "jokes" | "tell me a joke" => Some(JokeKind::Joke),
            "pun" | "puns" | "tell me a pun" => Some(JokeKind::Pun),
            "knock knock" | "knock knock joke" | "knockknock" => Some(JokeKind::KnockKnock),
            _ => None,
        }
    }

    fn button(self) -> Button {
        Button::new(self.label(), CallbackToken::Joke(self).encode())
    }
}

pub struct CheerUpHandler;

impl CheerUpHandler {
    fn kind(request: &InboundRequest) -> Option<JokeKind> {
        pick_choice(
            request,
            &["jokeType", "joke_type", "type"],
            |token| match token {
                CallbackToken::Joke(kind) => Some(kind),
                _ => None,
            },
            JokeKind::from_label,
        )
    }
}

#[async_trait]
impl IntentHandler for CheerUpHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let Some(kind) = Self::kind(request) else {
            return Ok(HandlerResult::with_buttons(
                "What kind of laugh do you need? 😄",
                JokeKind::ALL.into_iter().map(JokeKind::button).collect(),
            ));
        };

        let text = match kind {
            JokeKind::Pun => PUN.to_string(),
            JokeKind::KnockKnock => KNOCK_KNOCK.to_string(),
            JokeKind::Joke => {
                let reply = services.upstream.joke().await;
                services.with_llm_fallback(reply, JOKE_PROMPT).await.text
            }
        };

        Ok(HandlerResult::with_buttons(
            text,
            vec![
                Button::new("😂 Another One", CallbackToken::Joke(kind).encode()),
                menu_button(),
            ],
        ))
    }
}
