//! Delivery of log payloads to Discord.
//!
//! The rotator only talks to a [`LogTransport`]; the serenity implementation
//! turns payloads into message builders and maps HTTP failures onto
//! [`DiscordError`] so retry decisions don't depend on serenity types.

use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use serenity::builder::{
    CreateAllowedMentions, CreateAttachment, CreateChannel, CreateEmbed, CreateEmbedFooter,
    CreateMessage,
};
use serenity::http::Http;
use serenity::model::channel::ChannelType;
use serenity::model::id::{ChannelId, GuildId};
use serenity::model::Timestamp;
use tracing::debug;

use crate::common::error::{DiscordError, DiscordResult};
use crate::messagelog::payload::{LogEmbed, LogPayload};

/// Wait used when Discord reports a rate limit without saying for how long.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Operations the message log needs from the platform.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Post a payload as one message.
    async fn send_message(&self, channel_id: ChannelId, payload: &LogPayload) -> DiscordResult<()>;

    /// Create a text channel under `category_id`.
    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
    ) -> DiscordResult<ChannelId>;

    async fn delete_channel(&self, channel_id: ChannelId) -> DiscordResult<()>;
}

/// Transport backed by serenity's HTTP client.
#[derive(Clone)]
pub struct SerenityTransport {
    http: Arc<Http>,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl LogTransport for SerenityTransport {
    async fn send_message(&self, channel_id: ChannelId, payload: &LogPayload) -> DiscordResult<()> {
        let builder = build_message(payload);

        channel_id
            .send_message(&*self.http, builder)
            .await
            .map(|message| debug!("Posted log message {} in {}", message.id, channel_id))
            .map_err(|e| classify_error(e, channel_id))
    }

    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
    ) -> DiscordResult<ChannelId> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .category(category_id);

        guild_id
            .create_channel(&*self.http, builder)
            .await
            .map(|channel| channel.id)
            .map_err(|e| classify_error(e, category_id))
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> DiscordResult<()> {
        channel_id
            .delete(&*self.http)
            .await
            .map(|_| ())
            .map_err(|e| classify_error(e, channel_id))
    }
}

fn build_embed(embed: &LogEmbed) -> CreateEmbed {
    let mut builder = CreateEmbed::new().title(&embed.title).colour(embed.colour);

    if let Some(ref description) = embed.description {
        builder = builder.description(description);
    }
    for field in &embed.fields {
        builder = builder.field(&field.name, &field.value, field.inline);
    }
    if let Some(ref footer) = embed.footer {
        builder = builder.footer(CreateEmbedFooter::new(footer));
    }
    if let Some(timestamp) = embed.timestamp {
        if let Ok(timestamp) = Timestamp::from_unix_timestamp(timestamp.timestamp()) {
            builder = builder.timestamp(timestamp);
        }
    }

    builder
}

/// Convert a payload into a serenity message builder. Mentions never ping.
fn build_message(payload: &LogPayload) -> CreateMessage {
    let mut builder = CreateMessage::new().allowed_mentions(CreateAllowedMentions::new());

    if let Some(ref content) = payload.content {
        builder = builder.content(content);
    }
    if let Some(ref embed) = payload.embed {
        builder = builder.embed(build_embed(embed));
    }

    let files: Vec<CreateAttachment> = payload
        .files
        .iter()
        .map(|file| CreateAttachment::bytes(file.data.clone(), file.filename.clone()))
        .collect();
    if !files.is_empty() {
        builder = builder.add_files(files);
    }

    builder
}

/// Map an HTTP status onto the error kinds the rotator reacts to.
fn classify_status(status: u16, message: String, channel_id: ChannelId) -> DiscordError {
    match status {
        429 => DiscordError::RateLimited {
            retry_after: DEFAULT_RETRY_AFTER,
        },
        403 => DiscordError::PermissionDenied { message },
        404 => DiscordError::ChannelNotFound {
            channel_id: channel_id.get(),
        },
        code if (500..600).contains(&code) => DiscordError::Transient { message },
        _ => DiscordError::Rejected { message },
    }
}

fn classify_error(error: serenity::Error, channel_id: ChannelId) -> DiscordError {
    match &error {
        serenity::Error::Http(http_error) => match http_error.status_code() {
            Some(status) => classify_status(status.as_u16(), http_error.to_string(), channel_id),
            // Timeouts and connection failures
            None => DiscordError::Transient {
                message: http_error.to_string(),
            },
        },
        serenity::Error::Io(e) => DiscordError::Transient {
            message: e.to_string(),
        },
        other => DiscordError::Rejected {
            message: other.to_string(),
        },
    }
}
