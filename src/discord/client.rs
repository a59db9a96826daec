//! Discord bot client.
//!
//! Builds the serenity client, forwards gateway events into one processing
//! loop and keeps the gateway connected. The loop owns the message cache and
//! turns events into message log reports.
//!
//! The forwarding channel is bounded. When the dispatch queue is full the
//! loop waits in a handler, the channel fills up and serenity's event tasks
//! wait in turn.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use chrono::{DateTime, Utc};
use serenity::async_trait;
use serenity::http::HttpBuilder;
use serenity::model::channel::Message;
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::types::timestamp_to_utc;
use crate::common::{GuildSnapshot, MessageSnapshot};
use crate::config::DiscordConfig;
use crate::discord::cache::MessageCache;
use crate::messagelog::{
    BulkDeletedMessages, DeletedMessage, EditedMessage, LogEventHandlers, SerenityTransport,
};

/// Longest wait between reconnection attempts.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

/// Gateway events waiting for the processing loop.
const EVENT_CHANNEL_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub enum DiscordBotEvent {
    /// Bot connected and ready.
    Ready(Ready),
    /// Guild data received.
    GuildCreate {
        context: Context,
        guild: GuildSnapshot,
    },
    /// Guild message posted.
    Message(MessageSnapshot),
    MessageUpdate {
        context: Context,
        new: Option<MessageSnapshot>,
        event: MessageUpdateEvent,
    },
    MessageDelete {
        guild_id: GuildId,
        channel_id: ChannelId,
        message_id: MessageId,
    },
    MessageDeleteBulk {
        guild_id: GuildId,
        channel_id: ChannelId,
        message_ids: Vec<MessageId>,
    },
    Disconnected,
}

struct DiscordBotEvents {
    discord_events_tx: mpsc::Sender<DiscordBotEvent>,
}

impl DiscordBotEvents {
    fn new(discord_events_tx: mpsc::Sender<DiscordBotEvent>) -> Self {
        Self { discord_events_tx }
    }

    /// Hand an event to the processing loop, waiting while it is behind.
    async fn forward(&self, event: DiscordBotEvent) {
        if let Err(error) = self.discord_events_tx.send(event).await {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

#[async_trait]
impl EventHandler for DiscordBotEvents {
    async fn ready(&self, _context: Context, ready: Ready) {
        self.forward(DiscordBotEvent::Ready(ready)).await;
    }

    async fn guild_create(&self, context: Context, guild: Guild, _is_new: Option<bool>) {
        let guild = GuildSnapshot::from(&guild);
        self.forward(DiscordBotEvent::GuildCreate { context, guild }).await;
    }

    async fn message(&self, _context: Context, message: Message) {
        if message.guild_id.is_some() {
            self.forward(DiscordBotEvent::Message(MessageSnapshot::from(&message))).await;
        }
    }

    async fn message_update(
        &self,
        context: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let new = new.as_ref().map(MessageSnapshot::from);
        self.forward(DiscordBotEvent::MessageUpdate { context, new, event }).await;
    }

    async fn message_delete(
        &self,
        _context: Context,
        channel_id: ChannelId,
        message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        if let Some(guild_id) = guild_id {
            self.forward(DiscordBotEvent::MessageDelete {
                guild_id,
                channel_id,
                message_id,
            })
            .await;
        }
    }

    async fn message_delete_bulk(
        &self,
        _context: Context,
        channel_id: ChannelId,
        message_ids: Vec<MessageId>,
        guild_id: Option<GuildId>,
    ) {
        if let Some(guild_id) = guild_id {
            self.forward(DiscordBotEvent::MessageDeleteBulk {
                guild_id,
                channel_id,
                message_ids,
            })
            .await;
        }
    }
}

async fn build_client(
    token: &str,
    discord_events_tx: mpsc::Sender<DiscordBotEvent>,
) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Build a custom reqwest client with timeout settings
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let http = HttpBuilder::new(token).client(reqwest_client).build();

    let events = DiscordBotEvents::new(discord_events_tx);
    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(events)
        .await?;
    Ok(client)
}

pub struct MessageLogBot {
    client: Option<Client>,
    token: String,
    handlers: LogEventHandlers,
    cache: MessageCache,
    discord_events_rx: mpsc::Receiver<DiscordBotEvent>,
    discord_events_tx: mpsc::Sender<DiscordBotEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl MessageLogBot {
    /// Build the bot. Connecting happens in [`MessageLogBot::run`].
    pub async fn build(
        config: &DiscordConfig,
        handlers: LogEventHandlers,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let (discord_events_tx, discord_events_rx) =
            mpsc::channel::<DiscordBotEvent>(EVENT_CHANNEL_CAPACITY);
        let client = build_client(&config.token, discord_events_tx.clone()).await?;

        Ok(Self {
            client: Some(client),
            token: config.token.clone(),
            handlers,
            cache: MessageCache::new(config.cache_messages_per_channel),
            discord_events_rx,
            discord_events_tx,
            shutdown_rx,
        })
    }

    pub async fn run(mut self) {
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::select! {
            _ = Self::run_connection(&mut self.client, &self.token, &self.discord_events_tx) => {},
            _ = Self::process_events(
                &mut self.discord_events_rx,
                &self.handlers,
                &mut self.cache,
                &mut self.shutdown_rx,
            ) => {},
            _ = async {
                loop {
                    if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                if let Some(ref manager) = shard_manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            } => {}
        }
        info!("Discord task ended");
    }

    async fn run_connection(
        client: &mut Option<Client>,
        token: &str,
        discord_events_tx: &mpsc::Sender<DiscordBotEvent>,
    ) {
        /// Exponential backoff for Discord reconnection.
        /// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
        fn discord_backoff() -> impl Iterator<Item = Duration> {
            backon::ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(5))
                .with_max_delay(MAX_RECONNECT_DELAY)
                .with_factor(1.1)
                .with_jitter()
                .without_max_times()
                .build()
        }

        let mut backoff = discord_backoff();

        loop {
            info!("Connecting to Discord...");

            let mut client = match client.take() {
                Some(client) => client,
                None => match build_client(token, discord_events_tx.clone()).await {
                    Ok(client) => {
                        backoff = discord_backoff();
                        client
                    }
                    Err(e) => {
                        error!("Failed to rebuild Discord client: {}", e);
                        let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                        warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                        sleep(delay).await;
                        continue;
                    }
                },
            };

            let result = client.start().await;
            if let Err(error) = discord_events_tx.send(DiscordBotEvent::Disconnected).await {
                warn!("Failed to process discord event: {}", error);
            }

            match result {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    break;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn process_events(
        discord_events_rx: &mut mpsc::Receiver<DiscordBotEvent>,
        handlers: &LogEventHandlers,
        cache: &mut MessageCache,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = discord_events_rx.recv() => {
                    match event {
                        Some(event) => Self::handle_event(event, handlers, cache).await,
                        None => {
                            debug!("Discord events channel closed.");
                            break;
                        }
                    }
                }

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping event processing");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_event(
        event: DiscordBotEvent,
        handlers: &LogEventHandlers,
        cache: &mut MessageCache,
    ) {
        match event {
            DiscordBotEvent::Ready(ready) => {
                info!("Discord bot connected as {}", ready.user.name);
            }
            DiscordBotEvent::GuildCreate { context, guild } => {
                let transport = Arc::new(SerenityTransport::new(context.http.clone()));
                handlers.guild_available(&guild, transport).await;
            }
            DiscordBotEvent::Message(message) => {
                if message.guild_id.is_some_and(|id| handlers.filter().allows(id)) {
                    cache.insert(message);
                }
            }
            DiscordBotEvent::MessageUpdate { context, new, event } => {
                Self::handle_message_update(context, new, event, handlers, cache).await;
            }
            DiscordBotEvent::MessageDelete {
                guild_id,
                channel_id,
                message_id,
            } => {
                let cached = cache.remove(channel_id, message_id);
                handlers
                    .message_deleted(DeletedMessage {
                        guild_id,
                        channel_id,
                        message_id,
                        cached,
                    })
                    .await;
            }
            DiscordBotEvent::MessageDeleteBulk {
                guild_id,
                channel_id,
                message_ids,
            } => {
                let cached = cache.remove_many(channel_id, &message_ids);
                debug!(
                    guild_id = %guild_id,
                    "Bulk delete of {} messages, {} cached ({} messages still cached)",
                    message_ids.len(),
                    cached.len(),
                    cache.len()
                );
                handlers
                    .messages_bulk_deleted(BulkDeletedMessages {
                        guild_id,
                        channel_id,
                        message_ids,
                        cached,
                    })
                    .await;
            }
            DiscordBotEvent::Disconnected => {
                debug!("Discord connection lost");
            }
        }
    }

    async fn handle_message_update(
        context: Context,
        new: Option<MessageSnapshot>,
        event: MessageUpdateEvent,
        handlers: &LogEventHandlers,
        cache: &mut MessageCache,
    ) {
        let Some(guild_id) = event.guild_id else {
            return;
        };
        if !handlers.filter().allows(guild_id) {
            return;
        }

        let version = edited_version(
            new,
            event.content.clone(),
            event.edited_timestamp.as_ref().map(timestamp_to_utc),
            cache.get(event.channel_id, event.id),
        );

        let new = match version {
            EditedVersion::Unchanged(new) => {
                if let Some(new) = new {
                    cache.update(new);
                }
                return;
            }
            EditedVersion::Known(new) => new,
            EditedVersion::Unknown => {
                let fetched = event.channel_id.message(&context.http, event.id).await;
                match fetched {
                    Ok(message) => MessageSnapshot::from(&message),
                    Err(e) => {
                        warn!(
                            guild_id = %guild_id,
                            "Failed to fetch edited message {}: {}",
                            event.id,
                            e
                        );
                        return;
                    }
                }
            }
        };
        let new = MessageSnapshot {
            guild_id: Some(guild_id),
            ..new
        };

        let old = cache.update(new.clone());
        handlers
            .message_edited(EditedMessage { guild_id, old, new })
            .await;
    }
}

/// New version of an edited message, as far as the gateway and cache know it.
#[derive(Debug, PartialEq)]
enum EditedVersion {
    /// The text didn't change (embed unfurls and similar). Carries the
    /// refreshed message when the gateway sent one.
    Unchanged(Option<MessageSnapshot>),
    Known(MessageSnapshot),
    /// Has to be fetched over REST.
    Unknown,
}

fn edited_version(
    new: Option<MessageSnapshot>,
    content: Option<String>,
    edited_timestamp: Option<DateTime<Utc>>,
    cached: Option<&MessageSnapshot>,
) -> EditedVersion {
    let Some(content) = content else {
        return EditedVersion::Unchanged(new);
    };

    match (new, cached) {
        (Some(new), _) => EditedVersion::Known(new),
        (None, Some(cached)) => EditedVersion::Known(MessageSnapshot {
            content,
            edited_timestamp,
            ..cached.clone()
        }),
        (None, None) => EditedVersion::Unknown,
    }
}
