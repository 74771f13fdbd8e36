use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::compose::HandlerResult;
use crate::handlers::cheer::JokeKind;
use crate::handlers::coping::CopingCategory;
use crate::handlers::{self, session::DefaultHandler};
use crate::intent::{self, CallbackToken, Intent};
use crate::platform::InboundRequest;
use crate::store::Stores;
use crate::upstream::{Reply, Upstream};

/// Collaborators every handler may use
#[derive(Clone)]
pub struct Services {
    pub upstream: Arc<dyn Upstream>,
    pub stores: Stores,
    /// Ask the generative model when a quote or joke fetch fails
    pub llm_fallback: bool,
}

impl Services {
    /// Replace a fallback reply with generated text, if enabled and the model answers
    pub async fn with_llm_fallback(&self, reply: Reply, prompt: &str) -> Reply {
        if reply.is_live() || !self.llm_fallback {
            return reply;
        }
        let generated = self.upstream.generate(prompt).await;
        if generated.is_live() {
            generated
        } else {
            reply
        }
    }
}

#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, services: &Services, request: &InboundRequest) -> Result<HandlerResult>;
}

/// Dispatch table from intent to handler, built once at startup
pub struct Router {
    services: Services,
    handlers: HashMap<Intent, Arc<dyn IntentHandler>>,
    fallback: Arc<dyn IntentHandler>,
}

impl Router {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            handlers: HashMap::new(),
            fallback: Arc::new(DefaultHandler),
        }
    }

    pub fn with_default_handlers(services: Services) -> Self {
        let mut router = Self::new(services);
        for (intent, handler) in handlers::default_handlers() {
            router.register(intent, handler);
        }
        router
    }

    pub fn register(&mut self, intent: Intent, handler: Arc<dyn IntentHandler>) {
        if self.handlers.insert(intent, handler).is_some() {
            warn!("Replaced handler for {:?}", intent);
        }
    }

    /// Pick the intent for a request.
    ///
    /// A specific intent name decides alone. Generic names defer to the
    /// tapped button, then to the typed text.
    pub fn resolve(request: &InboundRequest) -> Option<Intent> {
        if !intent::is_generic(&request.intent_name) {
            return Intent::from_name(&request.intent_name);
        }

        request
            .callback_data
            .as_deref()
            .and_then(resolve_button)
            .or_else(|| CallbackToken::parse(&request.utterance).map(CallbackToken::intent))
            .or_else(|| Intent::from_name(&request.utterance))
    }

    /// Run exactly one handler. Never fails: errors, panics and empty
    /// replies all become the default reply.
    pub async fn dispatch(&self, request: &InboundRequest) -> HandlerResult {
        if request.is_blank() {
            warn!(
                "Malformed request for session {}: no intent, button or text",
                request.session_id
            );
        }
        let intent = Self::resolve(request);
        let handler = intent
            .and_then(|i| self.handlers.get(&i))
            .unwrap_or(&self.fallback);

        debug!(
            "Dispatching {:?} for session {} (intent name {:?})",
            intent, request.session_id, request.intent_name
        );

        let outcome = AssertUnwindSafe(handler.handle(&self.services, request))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) if !result.text.trim().is_empty() => result,
            Ok(Ok(_)) => {
                warn!("Handler for {:?} returned empty text", intent);
                handlers::default_reply()
            }
            Ok(Err(e)) => {
                error!("Handler for {:?} failed: {:#}", intent, e);
                handlers::default_reply()
            }
            Err(_) => {
                error!("Handler for {:?} panicked", intent);
                handlers::default_reply()
            }
        }
    }
}

/// Button data: a callback token, or a legacy human-readable value
fn resolve_button(data: &str) -> Option<Intent> {
    if let Some(token) = CallbackToken::parse(data) {
        return Some(token.intent());
    }
    Intent::from_name(data)
        .or_else(|| JokeKind::from_label(data).map(|_| Intent::CheerUp))
        .or_else(|| CopingCategory::from_label(data).map(|_| Intent::CopingStrategies))
}


#[cfg(test)]
mod tests {
    use super::test_support::{services, FakeUpstream};
    use super::*;
    use crate::handlers::cheer::PUN;
    use crate::handlers::DEFAULT_REPLY;
    use crate::platform::Platform;
    use crate::upstream::JOKE_FALLBACK;

    fn router(upstream: FakeUpstream) -> (Router, Arc<FakeUpstream>) {
        let (services, upstream) = services(upstream);
        (Router::with_default_handlers(services), upstream)
    }

    fn request() -> InboundRequest {
        InboundRequest::new("abc", Platform::Generic)
    }

    struct FailingHandler;

    #[async_trait]
    impl IntentHandler for FailingHandler {
        async fn handle(&self, _: &Services, _: &InboundRequest) -> Result<HandlerResult> {
            anyhow::bail!("boom")
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl IntentHandler for PanickingHandler {
        async fn handle(&self, _: &Services, _: &InboundRequest) -> Result<HandlerResult> {
            panic!("handler bug")
        }
    }

    struct SilentHandler;

    #[async_trait]
    impl IntentHandler for SilentHandler {
        async fn handle(&self, _: &Services, _: &InboundRequest) -> Result<HandlerResult> {
            Ok(HandlerResult::text("  "))
        }
    }

    #[test]
    fn test_resolve_priority() {
        let named = request()
            .with_intent("Get Motivation")
            .with_callback("mb:cheer")
            .with_utterance("menu");
        assert_eq!(Router::resolve(&named), Some(Intent::GetMotivation));

        let generic = request()
            .with_intent("Default Fallback Intent")
            .with_callback("mb:cheer")
            .with_utterance("menu");
        assert_eq!(Router::resolve(&generic), Some(Intent::CheerUp));

        let text_only = request().with_utterance("/start");
        assert_eq!(Router::resolve(&text_only), Some(Intent::SessionStart));
    }

    #[test]
    fn test_unknown_specific_intent_does_not_fall_through() {
        let request = request().with_intent("Order Pizza").with_callback("mb:cheer");
        assert_eq!(Router::resolve(&request), None);
    }

    #[test]
    fn test_legacy_button_values() {
        assert_eq!(
            Router::resolve(&request().with_callback("Pun")),
            Some(Intent::CheerUp)
        );
        assert_eq!(
            Router::resolve(&request().with_callback("Get Motivation")),
            Some(Intent::GetMotivation)
        );
        assert_eq!(
            Router::resolve(&request().with_callback("Sleep")),
            Some(Intent::CopingStrategies)
        );
    }

    #[test]
    fn test_token_typed_as_text() {
        let request = request().with_utterance("mb:coping:stress");
        assert_eq!(Router::resolve(&request), Some(Intent::CopingStrategies));
    }

    #[tokio::test]
    async fn test_every_intent_dispatches_non_empty() {
        let (router, _) = router(FakeUpstream::live());
        for intent in Intent::ALL {
            let request = request().with_callback(CallbackToken::Intent(intent).encode());
            let result = router.dispatch(&request).await;
            assert!(!result.text.trim().is_empty(), "{:?}", intent);
        }
    }

    #[tokio::test]
    async fn test_every_intent_survives_failing_upstream() {
        let (router, _) = router(FakeUpstream::failing());
        for intent in Intent::ALL {
            let request = request().with_callback(CallbackToken::Intent(intent).encode());
            assert!(!router.dispatch(&request).await.text.is_empty());
        }
    }

    #[tokio::test]
    async fn test_unmatched_gets_default_reply() {
        let (router, upstream) = router(FakeUpstream::live());
        for _ in 0..2 {
            let result = router.dispatch(&request().with_utterance("qwerty")).await;
            assert_eq!(result, HandlerResult::text(DEFAULT_REPLY));
        }
        assert_eq!(router.dispatch(&request()).await.text, DEFAULT_REPLY);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cheer_up_with_pun_callback() {
        let (router, upstream) = router(FakeUpstream::live());
        let request = request().with_intent("Cheer Up").with_callback("Pun");
        assert_eq!(router.dispatch(&request).await.text, PUN);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_joke_timeout_falls_back() {
        let (router, _) = router(FakeUpstream::failing());
        let request = request().with_intent("Cheer Up").with_parameter("jokeType", "Joke");
        assert_eq!(router.dispatch(&request).await.text, JOKE_FALLBACK);
    }

    #[tokio::test]
    async fn test_start_then_motivation_counts() {
        let (router, _) = router(FakeUpstream::live());
        let start = request().with_intent("Default Welcome Intent");
        let motivate = request().with_intent("Get Motivation");

        router.dispatch(&start).await;
        assert_eq!(router.services.stores.streaks.get("abc").await.unwrap(), 0);
        router.dispatch(&motivate).await;
        assert_eq!(router.services.stores.streaks.get("abc").await.unwrap(), 1);
        router.dispatch(&motivate).await;
        assert_eq!(router.services.stores.streaks.get("abc").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_handler_failures_become_default_reply() {
        let (services, _) = services(FakeUpstream::live());
        let mut router = Router::new(services);
        router.register(Intent::Ask, Arc::new(FailingHandler));
        router.register(Intent::CheerUp, Arc::new(PanickingHandler));
        router.register(Intent::SessionEnd, Arc::new(SilentHandler));

        for name in ["Ask", "Cheer Up", "Session End"] {
            let result = router.dispatch(&request().with_intent(name)).await;
            assert_eq!(result.text, DEFAULT_REPLY, "{}", name);
        }
    }
}
