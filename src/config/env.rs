//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `MESSAGELOG_DISCORD_TOKEN` - Discord bot token
//! - `MESSAGELOG_GUILDS` - comma-separated guild allow-list
//! - `MESSAGELOG_CATEGORIES` - comma-separated, ordered log category ids
//! - `MESSAGELOG_MODERATION_LOG` - name of the moderation log channel

use std::env;

use tracing::warn;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "MESSAGELOG";

/// Apply environment variable overrides to a config.
///
/// This allows the token to be provided via the environment instead of the
/// config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }

    if let Ok(guilds) = env::var(format!("{}_GUILDS", ENV_PREFIX)) {
        config.discord.guilds = parse_id_list(&guilds);
    }

    if let Ok(categories) = env::var(format!("{}_CATEGORIES", ENV_PREFIX)) {
        config.message_log.categories = parse_id_list(&categories);
    }

    if let Ok(name) = env::var(format!("{}_MODERATION_LOG", ENV_PREFIX)) {
        config.message_log.moderation_log_channel = name;
    }

    config
}

/// Parse a comma-separated list of snowflake ids, skipping malformed entries.
pub fn parse_id_list(value: &str) -> Vec<u64> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring malformed id '{}' in environment override", s);
                None
            }
        })
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `MESSAGELOG_CONFIG` environment variable, otherwise returns "message-log.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "message-log.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_test_config() -> Config {
        Config {
            discord: DiscordConfig {
                token: "original_token".to_string(),
                guilds: vec![1],
                cache_messages_per_channel: 200,
            },
            message_log: MessageLogConfig {
                categories: vec![10, 20],
                moderation_log_channel: DEFAULT_MODERATION_LOG_CHANNEL.to_string(),
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                rotation: RotationConfig::default(),
            },
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "MESSAGELOG");
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1, 2,3"), vec![1, 2, 3]);
        assert_eq!(parse_id_list(" 5 ,, abc, 6"), vec![5, 6]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_apply_env_overrides_no_vars() {
        env::remove_var("MESSAGELOG_DISCORD_TOKEN");
        env::remove_var("MESSAGELOG_GUILDS");
        env::remove_var("MESSAGELOG_CATEGORIES");
        env::remove_var("MESSAGELOG_MODERATION_LOG");

        let result = apply_env_overrides(make_test_config());

        assert_eq!(result.discord.token, "original_token");
        assert_eq!(result.discord.guilds, vec![1]);
        assert_eq!(result.message_log.categories, vec![10, 20]);
    }
}
