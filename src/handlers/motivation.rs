use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::intent_button;
use crate::compose::HandlerResult;
use crate::intent::Intent;
use crate::platform::InboundRequest;
use crate::router::{IntentHandler, Services};

const QUOTE_PROMPT: &str = "Give me an inspiring quote.";

/// Quote of the moment. A live quote extends the session's mood streak;
/// a fallback quote leaves it alone.
pub struct MotivationHandler;

#[async_trait]
impl IntentHandler for MotivationHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let reply = services.upstream.quote().await;
        let quote = services.with_llm_fallback(reply, QUOTE_PROMPT).await;
        let mut text = quote.text.clone();

        if quote.is_live() {
            match services.stores.streaks.increment(&request.session_id).await {
                Ok(streak) => {
                    debug!("Mood streak for {} is now {}", request.session_id, streak);
                    if streak >= 2 {
                        text.push_str(&format!(
                            "\n\n🔥 That's {} motivation boosts in a row. Keep going!",
                            streak
                        ));
                    }
                }
                Err(e) => warn!("Failed to update streak for {}: {:#}", request.session_id, e),
            }
        }

        Ok(HandlerResult::with_buttons(
            text,
            vec![intent_button("🔄 Another Quote", Intent::GetMotivation)],
        ))
    }
}
