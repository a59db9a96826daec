//! Configuration type definitions.

use std::time::Duration;

use serde::Deserialize;

/// Default bound of the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Channels Discord allows in one category.
pub const CATEGORY_CHANNEL_LIMIT: usize = 50;

/// Default name of the channel used for rotator notices.
pub const DEFAULT_MODERATION_LOG_CHANNEL: &str = "moderation-log";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub message_log: MessageLogConfig,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Guilds the log is active in. Empty means every guild the bot is in.
    #[serde(default)]
    pub guilds: Vec<u64>,
    /// Recent messages remembered per channel for delete/edit reports.
    #[serde(default = "default_cache_messages_per_channel")]
    pub cache_messages_per_channel: usize,
}

/// Message log pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageLogConfig {
    /// Candidate log categories, searched in order.
    pub categories: Vec<u64>,
    /// Exact name of the moderation log channel.
    #[serde(default = "default_moderation_log_channel")]
    pub moderation_log_channel: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub rotation: RotationConfig,
}

/// Log channel rotation and send pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    /// Prefix of the weekly log channel names.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Log channels kept in the category. The oldest are deleted only when
    /// the category would otherwise exceed [`CATEGORY_CHANNEL_LIMIT`].
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
    /// Minimum time between two sends of one rotator.
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    /// Retries for rate-limited or transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            channel_prefix: default_channel_prefix(),
            max_channels: default_max_channels(),
            min_send_interval_ms: default_min_send_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl RotationConfig {
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}

fn default_cache_messages_per_channel() -> usize {
    200
}

fn default_moderation_log_channel() -> String {
    DEFAULT_MODERATION_LOG_CHANNEL.to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_channel_prefix() -> String {
    "message-log".to_string()
}

fn default_max_channels() -> usize {
    CATEGORY_CHANNEL_LIMIT
}

fn default_min_send_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> usize {
    3
}
