use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{intent_button, menu_button};
use crate::compose::HandlerResult;
use crate::intent::Intent;
use crate::platform::InboundRequest;
use crate::router::{IntentHandler, Services};

const HISTORY_LIMIT: usize = 5;

pub struct LogMoodHandler;

#[async_trait]
impl IntentHandler for LogMoodHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let Some(mood) = request.param(&["userMood", "mood"]) else {
            return Ok(HandlerResult::text(
                "How are you feeling right now? Tell me in a word or two.",
            ));
        };

        match services.stores.moods.record(&request.session_id, mood).await {
            Ok(entry) => {
                info!("Logged mood {} for {}", entry.id, request.session_id);
                Ok(HandlerResult::with_buttons(
                    format!(
                        "Your mood, \"{}\", has been logged. Would you like to track your mood over time?",
                        mood
                    ),
                    vec![intent_button("📈 Mood History", Intent::MoodHistory)],
                ))
            }
            Err(e) => {
                warn!("Failed to log mood for {}: {:#}", request.session_id, e);
                Ok(HandlerResult::text("Sorry, there was an issue logging your mood."))
            }
        }
    }
}

pub struct MoodHistoryHandler;

#[async_trait]
impl IntentHandler for MoodHistoryHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let entries = services
            .stores
            .moods
            .recent(&request.session_id, HISTORY_LIMIT)
            .await?;

        if entries.is_empty() {
            return Ok(HandlerResult::with_buttons(
                "You haven't logged any moods yet. Tell me how you're feeling and I'll keep track.",
                vec![menu_button()],
            ));
        }

        let mut text = String::from("📈 Your recent moods:");
        for entry in &entries {
            text.push_str(&format!(
                "\n• {}: {}",
                entry.logged_at.format("%Y-%m-%d %H:%M UTC"),
                entry.mood
            ));
        }

        Ok(HandlerResult::with_buttons(text, vec![menu_button()]))
    }
}
