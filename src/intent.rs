//! Intent names and the callback tokens carried on buttons.

use crate::handlers::cheer::JokeKind;
use crate::handlers::coping::CopingCategory;

/// Prefix of every callback token this service emits.
/// Free text a user types will not normally start with it.
pub const CALLBACK_NAMESPACE: &str = "mb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    SessionStart,
    GetMotivation,
    CheerUp,
    CopingStrategies,
    Ask,
    SessionEnd,
    ReturnToMenu,
    LogMood,
    MoodHistory,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::SessionStart,
        Intent::GetMotivation,
        Intent::CheerUp,
        Intent::CopingStrategies,
        Intent::Ask,
        Intent::SessionEnd,
        Intent::ReturnToMenu,
        Intent::LogMood,
        Intent::MoodHistory,
    ];

    /// Short identifier used inside callback tokens
    pub fn slug(self) -> &'static str {
        match self {
            Intent::SessionStart => "start",
            Intent::GetMotivation => "motivation",
            Intent::CheerUp => "cheer",
            Intent::CopingStrategies => "coping",
            Intent::Ask => "ask",
            Intent::SessionEnd => "end",
            Intent::ReturnToMenu => "menu",
            Intent::LogMood => "log-mood",
            Intent::MoodHistory => "mood-history",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Intent> {
        Intent::ALL.into_iter().find(|i| i.slug() == slug)
    }

    /// Names the NLU agent, a button label or a typed command may use
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Intent::SessionStart => &[
                "default welcome intent",
                "welcome",
                "start",
                "/start",
                "session start",
            ],
            Intent::GetMotivation => &["get motivation", "motivation", "motivate me", "/motivate"],
            Intent::CheerUp => &["cheer up", "cheer me up", "/cheer"],
            Intent::CopingStrategies => &[
                "coping strategies",
                "coping strategy",
                "coping",
                "/coping",
            ],
            Intent::Ask => &["ask", "ask me anything", "open ended ask", "/ask"],
            Intent::SessionEnd => &["session end", "end session", "goodbye", "bye", "/stop"],
            Intent::ReturnToMenu => &["return to menu", "main menu", "menu", "back to menu", "/menu"],
            Intent::LogMood => &["log mood", "mood log", "/mood"],
            Intent::MoodHistory => &["mood history", "track mood", "/history"],
        }
    }

    /// Resolve an intent display name, button label or command
    pub fn from_name(name: &str) -> Option<Intent> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return None;
        }
        Intent::ALL
            .into_iter()
            .find(|i| i.aliases().contains(&normalized.as_str()))
    }
}

/// Intent names that carry no routing information of their own
pub fn is_generic(name: &str) -> bool {
    let normalized = normalize(name);
    normalized.is_empty() || normalized == "default fallback intent"
}

/// Case-fold, treat `-` and `_` as spaces, collapse whitespace, and drop the
/// `@botname` suffix Telegram appends to commands in group chats.
pub fn normalize(name: &str) -> String {
    let name = name.trim();
    let name = match (name.starts_with('/'), name.split_once('@')) {
        (true, Some((command, _))) => command,
        _ => name,
    };
    name.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parsed button payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackToken {
    Intent(Intent),
    Joke(JokeKind),
    Coping(CopingCategory),
}

impl CallbackToken {
    pub fn intent(self) -> Intent {
        match self {
            CallbackToken::Intent(intent) => intent,
            CallbackToken::Joke(_) => Intent::CheerUp,
            CallbackToken::Coping(_) => Intent::CopingStrategies,
        }
    }

    pub fn encode(self) -> String {
        match self {
            CallbackToken::Intent(intent) => format!("{}:{}", CALLBACK_NAMESPACE, intent.slug()),
            CallbackToken::Joke(kind) => format!(
                "{}:{}:{}",
                CALLBACK_NAMESPACE,
                Intent::CheerUp.slug(),
                kind.slug()
            ),
            CallbackToken::Coping(category) => format!(
                "{}:{}:{}",
                CALLBACK_NAMESPACE,
                Intent::CopingStrategies.slug(),
                category.slug()
            ),
        }
    }

    pub fn parse(data: &str) -> Option<CallbackToken> {
        let rest = data.trim().strip_prefix(CALLBACK_NAMESPACE)?.strip_prefix(':')?;
        let (head, choice) = match rest.split_once(':') {
            Some((head, choice)) => (head, Some(choice)),
            None => (rest, None),
        };
        let intent = Intent::from_slug(head)?;
        match (intent, choice) {
            (intent, None) => Some(CallbackToken::Intent(intent)),
            (Intent::CheerUp, Some(choice)) => JokeKind::from_slug(choice).map(CallbackToken::Joke),
            (Intent::CopingStrategies, Some(choice)) => {
                CopingCategory::from_slug(choice).map(CallbackToken::Coping)
            }
            _ => None,
        }
    }
}
