use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{default_reply, main_menu};
use crate::compose::HandlerResult;
use crate::platform::InboundRequest;
use crate::router::{IntentHandler, Services};

pub const WELCOME: &str = "Hi there! 👋 I'm here to lift your spirits. What would you like to do?";
pub const MENU_PROMPT: &str = "What would you like to do next?";

/// Starts a session and resets its mood streak
pub struct SessionStartHandler;

#[async_trait]
impl IntentHandler for SessionStartHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        services.stores.streaks.set(&request.session_id, 0).await?;
        info!("Session started: {}", request.session_id);
        Ok(HandlerResult::with_buttons(WELCOME, main_menu()))
    }
}

pub struct MenuHandler;

#[async_trait]
impl IntentHandler for MenuHandler {
    async fn handle(&self, _services: &Services, _request: &InboundRequest) -> Result<HandlerResult> {
        Ok(HandlerResult::with_buttons(MENU_PROMPT, main_menu()))
    }
}

pub struct SessionEndHandler;

#[async_trait]
impl IntentHandler for SessionEndHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let streak = match services.stores.streaks.get(&request.session_id).await {
            Ok(streak) => streak,
            Err(e) => {
                warn!("Failed to read streak for {}: {:#}", request.session_id, e);
                0
            }
        };

        let text = match streak {
            0 => "Take care of yourself! 💛 Come back any time you need a lift.".to_string(),
            1 => "Take care of yourself! 💛 You picked up 1 motivation boost today. Come back any time."
                .to_string(),
            n => format!(
                "Take care of yourself! 💛 You picked up {} motivation boosts today. Come back any time.",
                n
            ),
        };

        Ok(HandlerResult::text(text))
    }
}

/// Unmatched input. Has no side effects.
pub struct DefaultHandler;

#[async_trait]
impl IntentHandler for DefaultHandler {
    async fn handle(&self, _services: &Services, _request: &InboundRequest) -> Result<HandlerResult> {
        Ok(default_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::DEFAULT_REPLY;
    use crate::platform::Platform;
    use crate::router::test_support::{services, FakeUpstream};

    #[tokio::test]
    async fn test_start_resets_streak() {
        let (services, _) = services(FakeUpstream::live());
        services.stores.streaks.set("abc", 7).await.unwrap();

        let request = InboundRequest::new("abc", Platform::Telegram).with_utterance("/start");
        let result = SessionStartHandler.handle(&services, &request).await.unwrap();

        assert_eq!(result.text, WELCOME);
        assert_eq!(result.buttons, main_menu());
        assert_eq!(services.stores.streaks.get("abc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_end_reports_streak() {
        let (services, _) = services(FakeUpstream::live());
        services.stores.streaks.set("abc", 3).await.unwrap();

        let request = InboundRequest::new("abc", Platform::Generic);
        let result = SessionEndHandler.handle(&services, &request).await.unwrap();

        assert!(result.text.contains("3 motivation boosts"));
        assert!(result.buttons.is_empty());
    }

    #[tokio::test]
    async fn test_default_is_pure() {
        let (services, upstream) = services(FakeUpstream::live());
        let request = InboundRequest::new("abc", Platform::Generic).with_utterance("asdf");

        for _ in 0..3 {
            let result = DefaultHandler.handle(&services, &request).await.unwrap();
            assert_eq!(result, HandlerResult::text(DEFAULT_REPLY));
        }
        assert!(upstream.calls().is_empty());
        assert_eq!(services.stores.streaks.get("abc").await.unwrap(), 0);
    }
}
