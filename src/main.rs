mod compose;
mod config;
mod handlers;
mod intent;
mod platform;
mod router;
mod server;
mod store;
mod upstream;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::compose::Composer;
use crate::config::{Config, TelegramMode};
use crate::router::{Router, Services};
use crate::server::AppState;
use crate::store::Stores;
use crate::upstream::HttpUpstream;

const DEFAULT_CONFIG: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,moodbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; a missing default file means built-in defaults
    let explicit_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &explicit_path {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(Path::new(DEFAULT_CONFIG))?,
        None => {
            warn!("No {} found, using built-in defaults", DEFAULT_CONFIG);
            Config::default()
        }
    };

    info!("Configuration loaded successfully");
    info!("  Bind: {}", config.server.bind);
    info!("  Generative provider: {} ({})", config.generative.provider, config.generative.model);
    info!("  LLM fallback: {}", config.upstream.llm_fallback);
    info!("  Telegram: {:?} (token set: {})", config.telegram.mode, config.telegram.token().is_some());

    let stores = Stores::open(&config.store)
        .await
        .context("Failed to open session store")?;

    let upstream = HttpUpstream::new(config.upstream.clone(), config.generative.clone());

    let services = Services {
        upstream: Arc::new(upstream),
        stores,
        llm_fallback: config.upstream.llm_fallback,
    };

    let bot = config.telegram.token().map(Bot::new);
    let state = Arc::new(AppState {
        router: Router::with_default_handlers(services),
        composer: Composer::new(&config.response),
        include_fulfillment_text: config.response.include_fulfillment_text,
        bot: bot.clone(),
    });

    match (config.telegram.mode, bot) {
        (TelegramMode::Polling, Some(bot)) => {
            let polling = platform::telegram::run_polling(state.clone(), bot);
            tokio::try_join!(server::serve(&config.server.bind, state), polling)?;
        }
        (TelegramMode::Polling, None) => {
            warn!("telegram.mode is \"polling\" but no bot_token is set; serving webhooks only");
            server::serve(&config.server.bind, state).await?;
        }
        (TelegramMode::Webhook, _) => {
            server::serve(&config.server.bind, state).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    info!("Loading configuration from: {}", path.display());
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}
