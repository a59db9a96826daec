//! Platform snapshots consumed by the message log.
//!
//! Serenity models are converted into these plain values as soon as an event
//! arrives, so the formatter and the pipeline never touch the gateway types
//! (and can be tested without them).

use chrono::{DateTime, Utc};
use serenity::model::channel::{
    Attachment, ChannelType, GuildChannel, Message, MessageReaction, ReactionType,
};
use serenity::model::guild::Guild;
use serenity::model::id::{ChannelId, EmojiId, GuildId, MessageId, UserId, WebhookId};
use serenity::model::Timestamp;

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01).
pub const DISCORD_EPOCH_MILLIS: u64 = 1_420_070_400_000;

/// Extract the creation time embedded in a snowflake id.
pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) + DISCORD_EPOCH_MILLIS;
    DateTime::from_timestamp_millis(millis as i64).unwrap_or_default()
}

/// Convert a serenity timestamp, dropping sub-second precision.
pub fn timestamp_to_utc(timestamp: &Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageAuthor {
    /// A regular user account.
    User { id: UserId, tag: String },
    /// A webhook post; only the display name chosen by the webhook is known.
    Webhook {
        webhook_id: Option<WebhookId>,
        username: String,
    },
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub filename: String,
    pub size: u64,
    pub url: String,
    pub proxy_url: String,
    pub is_image: bool,
    pub is_spoiler: bool,
}

impl From<&Attachment> for AttachmentInfo {
    fn from(attachment: &Attachment) -> Self {
        Self {
            filename: attachment.filename.clone(),
            size: u64::from(attachment.size),
            url: attachment.url.clone(),
            proxy_url: attachment.proxy_url.clone(),
            is_image: attachment.width.is_some() || attachment.height.is_some(),
            is_spoiler: attachment.filename.starts_with("SPOILER_"),
        }
    }
}

/// Emoji used in a reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionEmoji {
    /// Guild emoji, identified by id.
    Custom { id: EmojiId, name: String },
    /// Standard unicode emoji.
    Unicode(String),
}

impl ReactionEmoji {
    pub fn name(&self) -> &str {
        match self {
            Self::Custom { name, .. } => name,
            Self::Unicode(name) => name,
        }
    }
}

/// A reaction and how many users added it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionInfo {
    pub emoji: ReactionEmoji,
    pub count: u64,
}

impl ReactionInfo {
    fn from_reaction(reaction: &MessageReaction) -> Option<Self> {
        let emoji = match &reaction.reaction_type {
            ReactionType::Custom { id, name, .. } => ReactionEmoji::Custom {
                id: *id,
                name: name.clone().unwrap_or_else(|| "unknown".to_string()),
            },
            ReactionType::Unicode(name) => ReactionEmoji::Unicode(name.clone()),
            _ => return None,
        };

        Some(Self {
            emoji,
            count: reaction.count,
        })
    }
}

/// Everything the log needs to know about a cached message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: MessageAuthor,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited_timestamp: Option<DateTime<Utc>>,
    pub attachments: Vec<AttachmentInfo>,
    /// Raw embed objects, rendered as JSON in bulk reports.
    pub embeds: Vec<serde_json::Value>,
    pub reactions: Vec<ReactionInfo>,
}

impl MessageSnapshot {
    /// Link that jumps to the message in the Discord client.
    pub fn jump_url(&self) -> String {
        match self.guild_id {
            Some(guild_id) => format!(
                "https://discord.com/channels/{}/{}/{}",
                guild_id, self.channel_id, self.id
            ),
            None => format!(
                "https://discord.com/channels/@me/{}/{}",
                self.channel_id, self.id
            ),
        }
    }

    /// Total number of reactions across all emoji.
    pub fn reaction_total(&self) -> u64 {
        self.reactions.iter().map(|r| r.count).sum()
    }
}

impl From<&Message> for MessageSnapshot {
    fn from(message: &Message) -> Self {
        let author = match message.webhook_id {
            Some(webhook_id) => MessageAuthor::Webhook {
                webhook_id: Some(webhook_id),
                username: message.author.name.clone(),
            },
            None => MessageAuthor::User {
                id: message.author.id,
                tag: message.author.tag(),
            },
        };

        Self {
            id: message.id,
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            author,
            content: message.content.clone(),
            timestamp: timestamp_to_utc(&message.timestamp),
            edited_timestamp: message.edited_timestamp.as_ref().map(timestamp_to_utc),
            attachments: message.attachments.iter().map(AttachmentInfo::from).collect(),
            embeds: message
                .embeds
                .iter()
                .filter_map(|embed| serde_json::to_value(embed).ok())
                .collect(),
            reactions: message
                .reactions
                .iter()
                .filter_map(ReactionInfo::from_reaction)
                .collect(),
        }
    }
}

/// Kind of guild channel, as far as log resolution cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Category,
    Text,
    Other,
}

/// A guild channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    pub position: u16,
}

impl From<&GuildChannel> for ChannelInfo {
    fn from(channel: &GuildChannel) -> Self {
        let kind = match channel.kind {
            ChannelType::Category => ChannelKind::Category,
            ChannelType::Text | ChannelType::News => ChannelKind::Text,
            _ => ChannelKind::Other,
        };

        Self {
            id: channel.id,
            name: channel.name.clone(),
            kind,
            parent_id: channel.parent_id,
            position: channel.position,
        }
    }
}

/// A guild and its channel list at the moment it became available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub id: GuildId,
    pub name: String,
    pub channels: Vec<ChannelInfo>,
}

impl From<&Guild> for GuildSnapshot {
    fn from(guild: &Guild) -> Self {
        let mut channels: Vec<ChannelInfo> =
            guild.channels.values().map(ChannelInfo::from).collect();
        channels.sort_by_key(|c| (c.position, c.id));

        Self {
            id: guild.id,
            name: guild.name.clone(),
            channels,
        }
    }
}
