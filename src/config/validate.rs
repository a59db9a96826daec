//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::{Config, CATEGORY_CHANNEL_LIMIT};

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    for (i, guild) in config.discord.guilds.iter().enumerate() {
        if *guild == 0 {
            errors.push(format!("discord.guilds[{}] must be non-zero", i));
        }
    }

    let log = &config.message_log;
    if log.categories.is_empty() {
        errors.push(
            "message_log.categories is empty - no log category can be resolved".to_string(),
        );
    }
    for (i, category) in log.categories.iter().enumerate() {
        if *category == 0 {
            errors.push(format!("message_log.categories[{}] must be non-zero", i));
        }
    }
    if log.moderation_log_channel.trim().is_empty() {
        errors.push("message_log.moderation_log_channel is required".to_string());
    }
    if log.queue_capacity == 0 {
        errors.push("message_log.queue_capacity must be at least 1".to_string());
    }

    let rotation = &log.rotation;
    if rotation.channel_prefix.is_empty() {
        errors.push("message_log.rotation.channel_prefix is required".to_string());
    }
    if !rotation
        .channel_prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        errors.push(format!(
            "message_log.rotation.channel_prefix '{}' may only contain lowercase letters, digits, '-' and '_'",
            rotation.channel_prefix
        ));
    }
    if rotation.max_channels == 0 {
        errors.push("message_log.rotation.max_channels must be at least 1".to_string());
    }
    if rotation.max_channels > CATEGORY_CHANNEL_LIMIT {
        errors.push(format!(
            "message_log.rotation.max_channels must be at most {} (Discord's category limit)",
            CATEGORY_CHANNEL_LIMIT
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
