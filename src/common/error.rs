//! Error types for the application.

use std::time::Duration;

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Failures talking to Discord while delivering a log entry.
///
/// Split by how the rotator reacts: rate limits and transient failures are
/// retried, everything else drops the entry.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Transient failure: {message}")]
    Transient { message: String },

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: u64 },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Request rejected: {message}")]
    Rejected { message: String },
}

impl DiscordError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }
}

/// Reasons a guild cannot get a category rotator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No message log category found (searched {searched} candidates)")]
    NoCategory { searched: usize },

    #[error("No '{name}' channel found")]
    NoModerationLog { name: String },

    #[error("Invalid channel name pattern for prefix '{prefix}': {message}")]
    InvalidPrefix { prefix: String, message: String },
}

/// Dispatch queue errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Dispatch queue is closed")]
    Closed,
}

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;
