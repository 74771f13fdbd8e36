pub mod ask;
pub mod cheer;
pub mod coping;
pub mod mood;
pub mod motivation;
pub mod session;

use std::sync::Arc;

use crate::compose::{Button, HandlerResult};
use crate::intent::{CallbackToken, Intent};
use crate::platform::InboundRequest;
use crate::router::IntentHandler;

pub const DEFAULT_REPLY: &str =
    "I'm sorry, I didn't quite understand that. Try one of the options from the menu.";

/// What unmatched input, and any failed handler, turns into
pub fn default_reply() -> HandlerResult {
    HandlerResult::text(DEFAULT_REPLY)
}

pub fn intent_button(label: &str, intent: Intent) -> Button {
    Button::new(label, CallbackToken::Intent(intent).encode())
}

pub fn menu_button() -> Button {
    intent_button("🔙 Main Menu", Intent::ReturnToMenu)
}

pub fn main_menu() -> Vec<Button> {
    vec![
        intent_button("💪 Get Motivation", Intent::GetMotivation),
        intent_button("😄 Cheer Me Up", Intent::CheerUp),
        intent_button("🧘 Coping Strategies", Intent::CopingStrategies),
        intent_button("💬 Ask Me Anything", Intent::Ask),
        intent_button("📈 Mood History", Intent::MoodHistory),
    ]
}

/// The handler set a production router starts with
pub fn default_handlers() -> Vec<(Intent, Arc<dyn IntentHandler>)> {
    let handlers: [(Intent, Arc<dyn IntentHandler>); 9] = [
        (Intent::SessionStart, Arc::new(session::SessionStartHandler)),
        (Intent::GetMotivation, Arc::new(motivation::MotivationHandler)),
        (Intent::CheerUp, Arc::new(cheer::CheerUpHandler)),
        (Intent::CopingStrategies, Arc::new(coping::CopingHandler)),
        (Intent::Ask, Arc::new(ask::AskHandler)),
        (Intent::SessionEnd, Arc::new(session::SessionEndHandler)),
        (Intent::ReturnToMenu, Arc::new(session::MenuHandler)),
        (Intent::LogMood, Arc::new(mood::LogMoodHandler)),
        (Intent::MoodHistory, Arc::new(mood::MoodHistoryHandler)),
    ];
    handlers.into()
}

/// Find a sub-choice (joke kind, coping category) in a request.
///
/// Looks at the resolved slot parameters, then the tapped button, then the
/// typed text. Button data and text may be either a callback token or a
/// human-readable label.
fn pick_choice<T>(
    request: &InboundRequest,
    params: &[&str],
    from_token: impl Fn(CallbackToken) -> Option<T>,
    from_label: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    if let Some(choice) = request.param(params).and_then(|p| from_label(p)) {
        return Some(choice);
    }

    let sources = request
        .callback_data
        .as_deref()
        .into_iter()
        .chain(std::iter::once(request.utterance.as_str()));

    for text in sources {
        let choice = match CallbackToken::parse(text) {
            Some(token) => from_token(token),
            None => from_label(text),
        };
        if choice.is_some() {
            return choice;
        }
    }

    None
}

/// Normalized label with any leading emoji or punctuation removed
fn label_key(text: &str) -> String {
    crate::intent::normalize(text)
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim()
        .to_string()
}
