use anyhow::Result;
use async_trait::async_trait;

use super::{intent_button, label_key, menu_button, pick_choice};
use crate::compose::{Button, HandlerResult};
use crate::intent::{CallbackToken, Intent};
use crate::platform::InboundRequest;
use crate::router::{IntentHandler, Services};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopingCategory {
    Stress,
    Anxiety,
    Sadness,
    Sleep,
}

impl CopingCategory {
    pub const ALL: [CopingCategory; 4] = [
        CopingCategory::Stress,
        CopingCategory::Anxiety,
        CopingCategory::Sadness,
        CopingCategory::Sleep,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            CopingCategory::Stress => "stress",
            CopingCategory::Anxiety => "anxiety",
            CopingCategory::Sadness => "sadness",
            CopingCategory::Sleep => "sleep",
        }
    }

    pub fn from_slug(slug: &str) -> Option<CopingCategory> {
        CopingCategory::ALL.into_iter().find(|c| c.slug() == slug)
    }

    pub fn label(self) -> &'static str {
        match self {
            CopingCategory::Stress => "😣 Stress",
            CopingCategory::Anxiety => "😟 Anxiety",
            CopingCategory::Sadness => "😢 Sadness",
            CopingCategory::Sleep => "😴 Sleep",
        }
    }

    pub fn from_label(text: &str) -> Option<CopingCategory> {
        match label_key(text).as_str() {
            "stress" | "stressed" => Some(CopingCategory::Stress),
            "anxiety" | "anxious" | "worried" => Some(CopingCategory::Anxiety),
            "sadness" | "sad" | "down" => Some(CopingCategory::Sadness),
            "sleep" | "insomnia" | "can't sleep" => Some(CopingCategory::Sleep),
            _ => None,
        }
    }

    pub fn tip(self) -> &'static str {
        match self {
            CopingCategory::Stress => {
                "Try the 4-7-8 breath: breathe in for 4 seconds, hold for 7, then breathe out \
                 slowly for 8. Repeat it four times."
            }
            CopingCategory::Anxiety => {
                "Ground yourself with 5-4-3-2-1: name 5 things you can see, 4 you can touch, \
                 3 you can hear, 2 you can smell and 1 you can taste."
            }
            CopingCategory::Sadness => {
                "Reach out to someone you trust, even with a short message. Sharing how you \
                 feel often makes it a little lighter."
            }
            CopingCategory::Sleep => {
                "Put screens away 30 minutes before bed and keep your room cool and dark. \
                 A steady bedtime helps your body wind down."
            }
        }
    }

    fn button(self) -> Button {
        Button::new(self.label(), CallbackToken::Coping(self).encode())
    }
}

pub struct CopingHandler;

impl CopingHandler {
    fn category(request: &InboundRequest) -> Option<CopingCategory> {
        pick_choice(
            request,
            &["copingCategory", "coping_category", "category"],
            |token| match token {
                CallbackToken::Coping(category) => Some(category),
                _ => None,
            },
            CopingCategory::from_label,
        )
    }
}

#[async_trait]
impl IntentHandler for CopingHandler {
    async fn handle(&self, _services: &Services, request: &InboundRequest) -> Result<HandlerResult> {
        let Some(category) = Self::category(request) else {
            return Ok(HandlerResult::with_buttons(
                "Which of these is weighing on you most right now?",
                CopingCategory::ALL
                    .into_iter()
                    .map(CopingCategory::button)
                    .collect(),
            ));
        };

        Ok(HandlerResult::with_buttons(
            format!("🧘 {}", category.tip()),
            vec![
                intent_button("🧘 Another Strategy", Intent::CopingStrategies),
                menu_button(),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::router::test_support::{services, FakeUpstream};

    #[tokio::test]
    async fn test_category_from_token() {
        let (services, upstream) = services(FakeUpstream::live());
        let request = InboundRequest::new("s", Platform::Telegram).with_callback("mb:coping:sleep");
        let result = CopingHandler.handle(&services, &request).await.unwrap();

        assert!(result.text.contains(CopingCategory::Sleep.tip()));
        assert_eq!(result.buttons[0].data, "mb:coping");
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_category_from_parameter() {
        let (services, _) = services(FakeUpstream::live());
        let request = InboundRequest::new("s", Platform::Generic)
            .with_intent("Coping Strategies")
            .with_parameter("copingCategory", "Anxiety");
        let result = CopingHandler.handle(&services, &request).await.unwrap();
        assert!(result.text.contains(CopingCategory::Anxiety.tip()));
    }

    #[tokio::test]
    async fn test_no_category_shows_menu() {
        let (services, _) = services(FakeUpstream::live());
        let request = InboundRequest::new("s", Platform::Generic).with_intent("Coping Strategies");
        let result = CopingHandler.handle(&services, &request).await.unwrap();

        let data: Vec<&str> = result.buttons.iter().map(|b| b.data.as_str()).collect();
        assert_eq!(
            data,
            vec![
                "mb:coping:stress",
                "mb:coping:anxiety",
                "mb:coping:sadness",
                "mb:coping:sleep"
            ]
        );
    }

    #[test]
    fn test_legacy_labels() {
        assert_eq!(CopingCategory::from_label("Stress"), Some(CopingCategory::Stress));
        assert_eq!(CopingCategory::from_label("😴 Sleep"), Some(CopingCategory::Sleep));
        assert_eq!(CopingCategory::from_label("anger"), None);
    }
}
