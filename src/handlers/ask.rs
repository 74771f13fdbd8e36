use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{intent_button, menu_button};
use crate::compose::HandlerResult;
use crate::intent::{CallbackToken, Intent};
use crate::platform::InboundRequest;
use crate::router::{IntentHandler, Services};
use crate::upstream::{Reply, GENERATIVE_FALLBACK};

const ASK_PROMPT: &str = "What would you like to know? Ask me anything! 💬";

/// Open-domain question answering: a knowledge summary grounds the
/// generative answer.
pub struct AskHandler;

impl AskHandler {
    /// The user's question, ignoring button data and the words that only
    /// select this intent ("/ask", "Ask Me Anything")
    fn question(request: &InboundRequest) -> Option<&str> {
        let utterance = request.utterance.trim();
        let typed = Some(utterance).filter(|u| {
            !u.is_empty()
                && CallbackToken::parse(u).is_none()
                && Intent::from_name(u) != Some(Intent::Ask)
        });
        request.param(&["question"]).or(typed).or(request.param(&["topic"]))
    }
}

pub fn build_prompt(question: &str, summary: Option<&str>) -> String {
    match summary {
        Some(summary) => format!(
            "Use the background below to answer the question briefly and kindly.\n\n\
             Background: {}\n\nQuestion: {}\nAnswer:",
            summary, question
        ),
        None => format!(
            "Answer the question briefly and kindly.\n\nQuestion: {}\nAnswer:",
            question
        ),
    }
}

fn blend(summary: &Reply, answer: &Reply) -> String {
    match (summary.is_live(), answer.is_live()) {
        (true, true) => format!("📚 {}\n\n💬 {}", summary.text, answer.text),
        (true, false) => format!("📚 {}", summary.text),
        (false, true) => format!("💬 {}", answer.text),
        (false, false) => GENERATIVE_FALLBACK.to_string(),
    }
}

#[async_trait]
impl IntentHandler for AskHandler {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let Some(question) = Self::question(request) else {
            return Ok(HandlerResult::with_buttons(ASK_PROMPT, vec![menu_button()]));
        };
        let topic = request.param(&["topic"]).unwrap_or(question);

        let summary = services.upstream.summary(topic).await;
        debug!("Summary for {:?} live: {}", topic, summary.is_live());

        let prompt = build_prompt(question, summary.is_live().then_some(summary.text.as_str()));
        let answer = services.upstream.generate(&prompt).await;

        Ok(HandlerResult::with_buttons(
            blend(&summary, &answer),
            vec![intent_button("💬 Ask Another", Intent::Ask), menu_button()],
        ))
    }
}
