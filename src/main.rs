mod artifact;
mod classify;
mod config;
mod delivery;
mod extractor;
mod fetch;
mod platform;
mod relay;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::delivery::RetryPolicy;
use crate::extractor::ytdlp::YtDlp;
use crate::extractor::ExtractOptions;
use crate::fetch::FetchExecutor;
use crate::relay::Relay;
use crate::transport::telegram::{build_bot, TelegramTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vidrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Download dir: {}", config.download.directory.display());
    info!("  yt-dlp: {}", config.download.ytdlp_path);
    info!("  Max height: {}p", config.download.max_height);
    info!(
        "  Delivery: {} attempts, backoff base {}",
        config.delivery.attempts, config.delivery.backoff_base
    );

    let bot = build_bot(&config.telegram)?;

    let fetcher = FetchExecutor::new(
        Arc::new(YtDlp::new(config.download.ytdlp_path.clone())),
        ExtractOptions::from_config(&config.download),
        config.download.scan_limit,
    );
    let relay = Arc::new(Relay::new(
        Box::new(TelegramTransport::new(bot.clone())),
        fetcher,
        RetryPolicy::from_config(&config.delivery),
    ));

    info!("Bot is starting...");
    platform::telegram::run(relay, bot).await?;

    Ok(())
}
