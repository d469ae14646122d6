use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod ai;
mod bot;
mod channel;
mod config;
mod web;

use ai::fal::FalClient;
use ai::gemini::GeminiClient;
use ai::poller::JobPoller;
use bot::delivery::{Messenger, TelegramMessenger};
use channel::ChannelPoster;
use config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("🤖 Starting AI Post Bot...");

    // Load config
    let config = AppConfig::from_env()?;
    tracing::info!(
        "Config loaded. Gemini: {} / {}, Fal: {}",
        config.gemini_text_model,
        config.gemini_image_model,
        config.fal_model
    );

    // One pooled HTTP client for every outbound API call
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    let gemini = Arc::new(GeminiClient::new(http.clone(), &config));
    let fal = FalClient::new(http, &config.fal_key, &config.fal_model);
    let poller = JobPoller::new(Arc::new(fal));

    // Create the Telegram bot
    let bot = Bot::new(&config.telegram_bot_token);
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let shutdown = CancellationToken::new();

    let poster = config.channel_id.as_deref().map(|raw| {
        Arc::new(ChannelPoster::new(
            gemini.clone(),
            messenger.clone(),
            channel::parse_channel(raw),
            config.max_daily_posts,
            config.max_caption_lines,
        ))
    });

    match &poster {
        Some(poster) => {
            let slots = channel::schedule::posting_slots(
                config.post_start_hour,
                config.post_end_hour,
                config.post_interval_minutes,
            );
            tokio::spawn(poster.clone().run(slots, shutdown.clone()));
            tracing::info!("Scheduler started");
        }
        None => tracing::warn!("TELEGRAM_CHANNEL_ID not set; scheduled posts disabled"),
    }

    let web_state = web::WebState {
        poster: poster.clone(),
    };
    let web_shutdown = shutdown.clone();
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(port, web_state, web_shutdown).await {
            tracing::error!("Health server failed: {}", e);
        }
    });

    // Build shared application state
    let state = Arc::new(bot::AppState {
        config,
        gemini,
        poller,
        messenger,
        images: bot::image_context::ImageContextStore::new(),
        poster,
        shutdown: shutdown.clone(),
    });

    // Build the dispatcher
    let handler = bot::build_handler();

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Shutting down");
    shutdown.cancel();

    Ok(())
}
