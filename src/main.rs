//! Message log - Discord bot that archives deleted and edited messages
//!
//! Watches guild messages and posts a report for every deletion, bulk
//! deletion and edit into weekly log channels inside a log category.

mod common;
mod config;
mod discord;
mod messagelog;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use config::{env::get_config_path, load_and_validate};
use discord::MessageLogBot;
use messagelog::{GuildFilter, LogEventHandlers, MessageLog};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Message log v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        error!("See message-log.conf.example for reference.");
        e
    })?;

    info!("Configuration loaded successfully");
    if config.discord.guilds.is_empty() {
        info!("  Guilds: all");
    } else {
        info!("  Guilds: {:?}", config.discord.guilds);
    }
    info!("  Log categories: {:?}", config.message_log.categories);
    info!("  Moderation log: #{}", config.message_log.moderation_log_channel);
    info!(
        "  Rotation: #{}-<year>-w<week>, keeping {} channels",
        config.message_log.rotation.channel_prefix, config.message_log.rotation.max_channels
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ============================================================
    // Start the pipeline before any event can reach it
    // ============================================================
    let message_log = Arc::new(MessageLog::new(config.message_log.clone()));
    message_log.start().await;

    let handlers = LogEventHandlers::new(
        message_log.clone(),
        GuildFilter::new(config.discord.guilds.iter().copied()),
    );

    let discord_bot = MessageLogBot::build(&config.discord, handlers, shutdown_rx).await?;

    info!("Starting Discord bot...");
    let mut discord_task = tokio::spawn(discord_bot.run());

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping...");
            true
        }
        _ = &mut discord_task => false,
    };

    if shutdown {
        if let Err(e) = shutdown_tx.send(true) {
            debug!("Shutdown channel closed (Discord task already exited): {}", e);
        }
        match tokio::time::timeout(Duration::from_secs(5), discord_task).await {
            Ok(Ok(())) => info!("Discord client disconnected gracefully"),
            Ok(Err(e)) => warn!("Discord task panicked: {}", e),
            Err(_) => warn!("Discord shutdown timed out"),
        }
    }

    message_log.stop().await;

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
