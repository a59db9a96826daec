//! Test doubles and fixtures shared by the message log tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId, WebhookId};

use crate::common::error::{DiscordError, DiscordResult};
use crate::common::types::ChannelInfo;
use crate::common::{ChannelKind, GuildSnapshot, MessageAuthor, MessageSnapshot};
use crate::config::{MessageLogConfig, RotationConfig};
use crate::messagelog::payload::LogPayload;
use crate::messagelog::transport::LogTransport;

pub const GUILD: GuildId = GuildId::new(1);
pub const TEXT_CHANNEL: ChannelId = ChannelId::new(2);
pub const CATEGORY: ChannelId = ChannelId::new(100);
pub const MODERATION_LOG: ChannelId = ChannelId::new(200);

/// First id handed out for channels created through the transport.
const FIRST_CREATED_ID: u64 = 5000;

/// Cached user message in [`TEXT_CHANNEL`].
pub fn message(id: u64, content: &str) -> MessageSnapshot {
    MessageSnapshot {
        id: MessageId::new(id),
        channel_id: TEXT_CHANNEL,
        guild_id: Some(GUILD),
        author: MessageAuthor::User {
            id: UserId::new(3),
            tag: "someone".to_string(),
        },
        content: content.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap(),
        edited_timestamp: None,
        attachments: Vec::new(),
        embeds: Vec::new(),
        reactions: Vec::new(),
    }
}

/// Cached webhook message in [`TEXT_CHANNEL`].
pub fn webhook_message(id: u64, content: &str, webhook_id: Option<WebhookId>) -> MessageSnapshot {
    MessageSnapshot {
        author: MessageAuthor::Webhook {
            webhook_id,
            username: "relay-bot".to_string(),
        },
        ..message(id, content)
    }
}

pub fn category(id: u64, name: &str) -> ChannelInfo {
    ChannelInfo {
        id: ChannelId::new(id),
        name: name.to_string(),
        kind: ChannelKind::Category,
        parent_id: None,
        position: 0,
    }
}

pub fn text_channel(id: u64, name: &str, parent: Option<ChannelId>) -> ChannelInfo {
    ChannelInfo {
        id: ChannelId::new(id),
        name: name.to_string(),
        kind: ChannelKind::Text,
        parent_id: parent,
        position: 0,
    }
}

pub fn guild(channels: Vec<ChannelInfo>) -> GuildSnapshot {
    GuildSnapshot {
        id: GUILD,
        name: "Test Guild".to_string(),
        channels,
    }
}

/// Guild with a log category, a moderation log and one chat channel.
pub fn standard_guild() -> GuildSnapshot {
    guild(vec![
        category(CATEGORY.get(), "Logs"),
        text_channel(MODERATION_LOG.get(), "moderation-log", None),
        text_channel(TEXT_CHANNEL.get(), "general", None),
    ])
}

/// Settings matching [`standard_guild`], without send pacing.
pub fn log_config() -> MessageLogConfig {
    MessageLogConfig {
        categories: vec![CATEGORY.get()],
        moderation_log_channel: "moderation-log".to_string(),
        queue_capacity: 50,
        rotation: RotationConfig {
            min_send_interval_ms: 0,
            ..RotationConfig::default()
        },
    }
}

/// A transport call that went through.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        channel_id: ChannelId,
        payload: LogPayload,
    },
    Create {
        guild_id: GuildId,
        category_id: ChannelId,
        name: String,
        channel_id: ChannelId,
    },
    Delete {
        channel_id: ChannelId,
    },
}

/// In-memory transport that records every successful call.
///
/// Failures can be scripted per operation; each scripted error is returned
/// by exactly one attempt, in order.
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    send_failures: Mutex<VecDeque<DiscordError>>,
    create_failures: Mutex<VecDeque<DiscordError>>,
    delete_failures: Mutex<VecDeque<DiscordError>>,
    next_channel_id: AtomicU64,
    send_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    send_delay: Duration,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::with_send_delay(Duration::ZERO)
    }

    /// Every send takes `send_delay` to complete.
    pub fn with_send_delay(send_delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            send_failures: Mutex::new(VecDeque::new()),
            create_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(VecDeque::new()),
            next_channel_id: AtomicU64::new(FIRST_CREATED_ID),
            send_attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            send_delay,
        }
    }

    pub fn fail_sends(&self, errors: impl IntoIterator<Item = DiscordError>) {
        self.send_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_creates(&self, errors: impl IntoIterator<Item = DiscordError>) {
        self.create_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_deletes(&self, errors: impl IntoIterator<Item = DiscordError>) {
        self.delete_failures.lock().unwrap().extend(errors);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(ChannelId, LogPayload)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send {
                    channel_id,
                    payload,
                } => Some((channel_id, payload)),
                _ => None,
            })
            .collect()
    }

    /// Payloads posted anywhere but the moderation log.
    pub fn logged(&self) -> Vec<LogPayload> {
        self.sent()
            .into_iter()
            .filter(|(channel_id, _)| *channel_id != MODERATION_LOG)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Text of every moderation log notice.
    pub fn notices(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(channel_id, _)| *channel_id == MODERATION_LOG)
            .filter_map(|(_, payload)| payload.content)
            .collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<ChannelId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { channel_id } => Some(channel_id),
                _ => None,
            })
            .collect()
    }

    /// Sends attempted, failed ones included.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of sends that were in progress at once.
    pub fn max_concurrent_sends(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogTransport for RecordingTransport {
    async fn send_message(&self, channel_id: ChannelId, payload: &LogPayload) -> DiscordResult<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.send_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        self.calls.lock().unwrap().push(Call::Send {
            channel_id,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
    ) -> DiscordResult<ChannelId> {
        if let Some(error) = self.create_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let channel_id = ChannelId::new(self.next_channel_id.fetch_add(1, Ordering::SeqCst));
        self.calls.lock().unwrap().push(Call::Create {
            guild_id,
            category_id,
            name: name.to_string(),
            channel_id,
        });
        Ok(channel_id)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> DiscordResult<()> {
        if let Some(error) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        self.calls.lock().unwrap().push(Call::Delete { channel_id });
        Ok(())
    }
}
