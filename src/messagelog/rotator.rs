//! Per-guild owner of the log channels.
//!
//! A rotator resolves the guild's log category and moderation log channel,
//! then posts every payload for the guild into a weekly log channel named
//! `{prefix}-{iso_year}-w{iso_week}`. When the week changes the next send
//! creates (or adopts) the new channel and announces it in the moderation
//! log. Old log channels are kept; the oldest are deleted only when the
//! category would otherwise go over `max_channels` log channels or Discord's
//! per-category channel limit.
//!
//! Sends are serialized through one async mutex, so payloads for one guild
//! are posted in the order `send` was called and never concurrently.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use chrono::{DateTime, Datelike, Utc};
use fancy_regex::Regex;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::common::error::{DiscordError, DiscordResult, ResolutionError};
use crate::common::{ChannelKind, GuildSnapshot};
use crate::config::{MessageLogConfig, RotationConfig, CATEGORY_CHANNEL_LIMIT};
use crate::messagelog::formatter::channel_mention;
use crate::messagelog::payload::LogPayload;
use crate::messagelog::transport::LogTransport;

/// ISO year and week number.
type Week = (i32, u32);

fn week_of(time: DateTime<Utc>) -> Week {
    let week = time.iso_week();
    (week.year(), week.week())
}

/// Backoff for transient send failures: 500ms initial, 30s max, with jitter.
fn send_backoff(max_retries: usize) -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(30))
        .with_factor(2.0)
        .with_jitter()
        .with_max_times(max_retries)
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogChannel {
    id: ChannelId,
    name: String,
    week: Week,
}

#[derive(Debug, Default)]
struct RotationState {
    /// Log channels in the category, oldest first.
    channels: Vec<LogChannel>,
    /// Channel receiving payloads for the current week.
    active: Option<LogChannel>,
    last_send: Option<Instant>,
}

impl RotationState {
    fn insert(&mut self, channel: LogChannel) {
        self.channels.push(channel);
        self.channels.sort_by_key(|c| (c.week, c.id));
    }

    fn forget(&mut self, channel_id: ChannelId) {
        self.channels.retain(|c| c.id != channel_id);
        if self.active.as_ref().is_some_and(|c| c.id == channel_id) {
            self.active = None;
        }
    }
}

pub struct CategoryRotator {
    guild_id: GuildId,
    category_id: ChannelId,
    moderation_log_id: ChannelId,
    config: RotationConfig,
    /// Channels in the category that aren't log channels.
    other_channels: usize,
    transport: Arc<dyn LogTransport>,
    running: AtomicBool,
    stopped: AtomicBool,
    state: Mutex<RotationState>,
}

impl CategoryRotator {
    /// Resolve the log destination for a guild.
    ///
    /// The category is the first id of `config.categories` that is a category
    /// in the guild. The moderation log is the text channel named exactly
    /// `config.moderation_log_channel`. Existing weekly log channels inside the
    /// category are adopted.
    pub fn resolve(
        guild: &GuildSnapshot,
        config: &MessageLogConfig,
        transport: Arc<dyn LogTransport>,
    ) -> Result<Self, ResolutionError> {
        let category = config
            .categories
            .iter()
            .find_map(|id| {
                guild
                    .channels
                    .iter()
                    .find(|c| c.id.get() == *id && c.kind == ChannelKind::Category)
            })
            .ok_or(ResolutionError::NoCategory {
                searched: config.categories.len(),
            })?;

        let moderation_log = guild
            .channels
            .iter()
            .find(|c| c.kind == ChannelKind::Text && c.name == config.moderation_log_channel)
            .ok_or_else(|| ResolutionError::NoModerationLog {
                name: config.moderation_log_channel.clone(),
            })?;

        let prefix = &config.rotation.channel_prefix;
        let pattern = log_channel_pattern(prefix).map_err(|e| ResolutionError::InvalidPrefix {
            prefix: prefix.clone(),
            message: e.to_string(),
        })?;

        let mut state = RotationState::default();
        let mut other_channels = 0;
        for channel in &guild.channels {
            if channel.parent_id != Some(category.id) {
                continue;
            }
            let week = match channel.kind {
                ChannelKind::Text => parse_week(&pattern, &channel.name),
                _ => None,
            };
            match week {
                Some(week) => state.insert(LogChannel {
                    id: channel.id,
                    name: channel.name.clone(),
                    week,
                }),
                None => other_channels += 1,
            }
        }

        info!(
            guild_id = %guild.id,
            "Resolved message log for '{}': category '{}' ({}), moderation log #{} ({}), {} existing log channels",
            guild.name,
            category.name,
            category.id,
            moderation_log.name,
            moderation_log.id,
            state.channels.len()
        );

        Ok(Self {
            guild_id: guild.id,
            category_id: category.id,
            moderation_log_id: moderation_log.id,
            config: config.rotation.clone(),
            other_channels,
            transport,
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            state: Mutex::new(state),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    #[cfg(test)]
    pub fn category_id(&self) -> ChannelId {
        self.category_id
    }

    #[cfg(test)]
    pub fn moderation_log_id(&self) -> ChannelId {
        self.moderation_log_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Channel currently receiving payloads, if one has been chosen.
    #[cfg(test)]
    pub async fn active_channel(&self) -> Option<ChannelId> {
        self.state.lock().await.active.as_ref().map(|c| c.id)
    }

    /// Known log channels, oldest first.
    #[cfg(test)]
    pub async fn log_channels(&self) -> Vec<ChannelId> {
        self.state.lock().await.channels.iter().map(|c| c.id).collect()
    }

    /// Name of the log channel for the week containing `time`.
    pub fn channel_name(&self, time: DateTime<Utc>) -> String {
        let (year, week) = week_of(time);
        format!("{}-{}-w{:02}", self.config.channel_prefix, year, week)
    }

    /// Accept sends. A stopped rotator can't be started again.
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!(guild_id = %self.guild_id, "Ignoring start of a stopped rotator");
            return;
        }
        if !self.running.swap(true, Ordering::SeqCst) {
            debug!(guild_id = %self.guild_id, "Rotator started");
        }
    }

    /// Stop accepting sends and release channel references.
    ///
    /// Waits for a send already in progress to finish.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock().await;
        state.channels.clear();
        state.active = None;

        info!(guild_id = %self.guild_id, "Rotator stopped");
    }

    /// Post a payload to the current log channel.
    ///
    /// Never fails: payloads that can't be delivered are logged and dropped.
    pub async fn send(&self, payload: LogPayload) {
        self.send_at(payload, Utc::now()).await
    }

    pub(crate) async fn send_at(&self, payload: LogPayload, now: DateTime<Utc>) {
        if !self.is_running() {
            debug!(guild_id = %self.guild_id, "Rotator not running, dropping log message");
            return;
        }
        if payload.is_empty() {
            return;
        }

        let mut state = self.state.lock().await;

        // Stopped while waiting for the lock
        if !self.is_running() {
            debug!(guild_id = %self.guild_id, "Rotator stopped, dropping log message");
            return;
        }

        let channel_id = match self.ensure_channel(&mut state, now).await {
            Ok(channel_id) => channel_id,
            Err(e) => {
                warn!(
                    guild_id = %self.guild_id,
                    "No log channel available, dropping log message: {}",
                    e
                );
                return;
            }
        };

        match self.post(&mut state, channel_id, &payload).await {
            Ok(()) => debug!(guild_id = %self.guild_id, "Logged message to {}", channel_id),
            Err(DiscordError::ChannelNotFound { .. }) => {
                warn!(
                    guild_id = %self.guild_id,
                    "Log channel {} no longer exists, dropping log message",
                    channel_id
                );
                state.forget(channel_id);
            }
            Err(e) => {
                error!(
                    guild_id = %self.guild_id,
                    "Failed to post log message to {}, dropping it: {}",
                    channel_id,
                    e
                );
            }
        }
    }

    /// Make sure a log channel exists for the week containing `now`.
    async fn ensure_channel(
        &self,
        state: &mut RotationState,
        now: DateTime<Utc>,
    ) -> DiscordResult<ChannelId> {
        let week = week_of(now);

        if let Some(active) = &state.active {
            if active.week == week {
                return Ok(active.id);
            }
        }

        let existing = state.channels.iter().find(|c| c.week == week).cloned();
        let created = existing.is_none();

        let channel = match existing {
            Some(channel) => channel,
            None => {
                let name = self.channel_name(now);
                let id = self
                    .with_retries("create log channel", || {
                        self.transport
                            .create_text_channel(self.guild_id, self.category_id, &name)
                    })
                    .await?;

                info!(guild_id = %self.guild_id, "Created log channel #{} ({})", name, id);

                let channel = LogChannel { id, name, week };
                state.insert(channel.clone());
                channel
            }
        };

        let previous = state.active.replace(channel.clone());

        if created || previous.is_some() {
            let notice = match previous {
                Some(previous) => format!(
                    "Message log rotated from {} to {}.",
                    channel_mention(previous.id),
                    channel_mention(channel.id)
                ),
                None => format!("Message log is now posting to {}.", channel_mention(channel.id)),
            };
            self.notify(state, notice).await;
        }

        self.prune(state).await;

        Ok(channel.id)
    }

    /// Log channels the category has room for.
    fn channel_budget(&self) -> usize {
        let room = CATEGORY_CHANNEL_LIMIT.saturating_sub(self.other_channels);
        self.config.max_channels.min(room).max(1)
    }

    /// Delete the oldest log channels above the channel budget.
    async fn prune(&self, state: &mut RotationState) {
        let excess = state.channels.len().saturating_sub(self.channel_budget());
        if excess == 0 {
            return;
        }

        let active_id = state.active.as_ref().map(|c| c.id);
        let expired: Vec<LogChannel> = state
            .channels
            .iter()
            .filter(|c| Some(c.id) != active_id)
            .take(excess)
            .cloned()
            .collect();

        for channel in expired {
            let result = self
                .with_retries("delete log channel", || self.transport.delete_channel(channel.id))
                .await;

            match result {
                Ok(()) => {
                    info!(guild_id = %self.guild_id, "Deleted old log channel #{}", channel.name);
                    state.forget(channel.id);
                    let notice = format!("Deleted old message log channel `#{}`.", channel.name);
                    self.notify(state, notice).await;
                }
                Err(DiscordError::ChannelNotFound { .. }) => {
                    debug!(
                        guild_id = %self.guild_id,
                        "Old log channel #{} already gone",
                        channel.name
                    );
                    state.forget(channel.id);
                }
                Err(e) => {
                    warn!(
                        guild_id = %self.guild_id,
                        "Failed to delete old log channel #{}: {}",
                        channel.name,
                        e
                    );
                }
            }
        }
    }

    /// Post an administrative notice to the moderation log.
    async fn notify(&self, state: &mut RotationState, notice: String) {
        let payload = LogPayload::text(notice);
        if let Err(e) = self.post(state, self.moderation_log_id, &payload).await {
            warn!(guild_id = %self.guild_id, "Failed to post moderation log notice: {}", e);
        }
    }

    /// Send one payload, honouring the pacing interval and retrying
    /// rate-limited or transient failures.
    async fn post(
        &self,
        state: &mut RotationState,
        channel_id: ChannelId,
        payload: &LogPayload,
    ) -> DiscordResult<()> {
        if let Some(last) = state.last_send {
            let next = last + self.config.min_send_interval();
            if next > Instant::now() {
                sleep_until(next).await;
            }
        }

        let result = self
            .with_retries("send log message", || {
                self.transport.send_message(channel_id, payload)
            })
            .await;

        state.last_send = Some(Instant::now());
        result
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, mut attempt: F) -> DiscordResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DiscordResult<T>>,
    {
        let mut backoff = send_backoff(self.config.max_retries);

        loop {
            let error = match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            let Some(delay) = backoff.next() else {
                return Err(error);
            };
            let delay = match &error {
                DiscordError::RateLimited { retry_after } => *retry_after,
                _ => delay,
            };

            warn!(
                guild_id = %self.guild_id,
                "Failed to {}: {}. Retrying in {:.1}s...",
                operation,
                error,
                delay.as_secs_f64()
            );
            sleep(delay).await;
        }
    }
}

/// Pattern matching the weekly log channels for `prefix`.
fn log_channel_pattern(prefix: &str) -> Result<Regex, fancy_regex::Error> {
    Regex::new(&format!(
        r"^{}-(\d{{4}})-w(\d{{2}})$",
        fancy_regex::escape(prefix)
    ))
}

/// Extract the week from a log channel name.
fn parse_week(pattern: &Regex, name: &str) -> Option<Week> {
    let captures = pattern.captures(name).ok()??;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let week = captures.get(2)?.as_str().parse().ok()?;
    Some((year, week))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messagelog::testing::*;
    use chrono::TimeZone;

    // Monday of ISO week 2024-W10
    fn week_10() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn week_11() -> DateTime<Utc> {
        week_10() + chrono::Duration::days(7)
    }

    fn resolve(
        guild: &GuildSnapshot,
        config: &MessageLogConfig,
    ) -> Result<CategoryRotator, ResolutionError> {
        CategoryRotator::resolve(guild, config, Arc::new(RecordingTransport::new()))
    }

    fn started(
        guild: &GuildSnapshot,
        config: &MessageLogConfig,
        transport: &Arc<RecordingTransport>,
    ) -> CategoryRotator {
        let rotator = CategoryRotator::resolve(guild, config, transport.clone()).unwrap();
        rotator.start();
        rotator
    }

    #[test]
    fn test_resolve_first_matching_category() {
        let guild = guild(vec![
            category(100, "Logs"),
            category(101, "Old Logs"),
            text_channel(102, "not-a-category", None),
            text_channel(200, "moderation-log", None),
        ]);
        let mut config = log_config();
        config.categories = vec![999, 102, 101, 100];

        let rotator = resolve(&guild, &config).unwrap();
        assert_eq!(rotator.category_id(), ChannelId::new(101));
        assert_eq!(rotator.moderation_log_id(), ChannelId::new(200));
        assert_eq!(rotator.guild_id(), GUILD);
    }

    #[test]
    fn test_resolve_without_category_fails() {
        let mut config = log_config();
        config.categories = vec![12345];

        let result = resolve(&standard_guild(), &config);
        assert_eq!(result.err(), Some(ResolutionError::NoCategory { searched: 1 }));
    }

    #[test]
    fn test_resolve_without_moderation_log_fails() {
        let guild = guild(vec![category(100, "Logs"), text_channel(200, "mod-log", None)]);

        let result = resolve(&guild, &log_config());
        assert_eq!(
            result.err(),
            Some(ResolutionError::NoModerationLog {
                name: "moderation-log".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_adopts_existing_log_channels() {
        let mut guild = standard_guild();
        guild.channels.extend([
            text_channel(302, "message-log-2024-w09", Some(CATEGORY)),
            text_channel(301, "message-log-2023-w52", Some(CATEGORY)),
            text_channel(303, "message-log-notes", Some(CATEGORY)),
            text_channel(304, "message-log-2024-w08", None),
        ]);

        let rotator = resolve(&guild, &log_config()).unwrap();
        assert_eq!(
            rotator.log_channels().await,
            vec![ChannelId::new(301), ChannelId::new(302)]
        );
    }

    #[test]
    fn test_parse_week() {
        let pattern = log_channel_pattern("message-log").unwrap();

        assert_eq!(parse_week(&pattern, "message-log-2024-w09"), Some((2024, 9)));
        assert_eq!(parse_week(&pattern, "message-log-2024-w9"), None);
        assert_eq!(parse_week(&pattern, "other-2024-w09"), None);
        assert_eq!(parse_week(&pattern, "message-log-2024-w09-old"), None);
    }

    #[test]
    fn test_channel_name_uses_iso_week() {
        let rotator = resolve(&standard_guild(), &log_config()).unwrap();

        assert_eq!(rotator.channel_name(week_10()), "message-log-2024-w10");
        // Dec 30 2024 belongs to ISO week 1 of 2025
        let new_year = Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap();
        assert_eq!(rotator.channel_name(new_year), "message-log-2025-w01");
    }

    #[tokio::test]
    async fn test_first_send_creates_weekly_channel() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);

        rotator.send_at(LogPayload::text("entry"), week_10()).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        let Call::Create { name, category_id, channel_id, .. } = &calls[0] else {
            panic!("expected channel creation first, got {:?}", calls[0]);
        };
        assert_eq!(name, "message-log-2024-w10");
        assert_eq!(*category_id, CATEGORY);

        assert_eq!(transport.notices().len(), 1);
        assert!(transport.notices()[0].contains(&channel_mention(*channel_id)));

        let sent = transport.sent();
        assert_eq!(sent.last(), Some(&(*channel_id, LogPayload::text("entry"))));
        assert_eq!(rotator.active_channel().await, Some(*channel_id));
    }

    #[tokio::test]
    async fn test_same_week_reuses_channel() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);

        rotator.send_at(LogPayload::text("one"), week_10()).await;
        rotator.send_at(LogPayload::text("two"), week_10() + chrono::Duration::days(2)).await;

        assert_eq!(transport.created().len(), 1);
        assert_eq!(transport.notices().len(), 1);
        assert_eq!(transport.logged(), vec![LogPayload::text("one"), LogPayload::text("two")]);
    }

    #[tokio::test]
    async fn test_existing_channel_for_week_is_used_silently() {
        let mut guild = standard_guild();
        guild
            .channels
            .push(text_channel(310, "message-log-2024-w10", Some(CATEGORY)));

        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&guild, &log_config(), &transport);

        rotator.send_at(LogPayload::text("entry"), week_10()).await;

        assert!(transport.created().is_empty());
        assert!(transport.notices().is_empty());
        assert_eq!(
            transport.sent(),
            vec![(ChannelId::new(310), LogPayload::text("entry"))]
        );
    }

    #[tokio::test]
    async fn test_new_week_rotates_and_announces() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);

        rotator.send_at(LogPayload::text("old week"), week_10()).await;
        let first = rotator.active_channel().await.unwrap();

        rotator.send_at(LogPayload::text("new week"), week_11()).await;
        let second = rotator.active_channel().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(
            transport.created(),
            vec!["message-log-2024-w10", "message-log-2024-w11"]
        );

        let notices = transport.notices();
        assert_eq!(notices.len(), 2);
        assert!(notices[1].contains("rotated"));
        assert!(notices[1].contains(&channel_mention(first)));
        assert!(notices[1].contains(&channel_mention(second)));
        assert_eq!(transport.sent().last(), Some(&(second, LogPayload::text("new week"))));
    }

    #[tokio::test]
    async fn test_rotation_prunes_oldest_channels() {
        let mut guild = standard_guild();
        guild.channels.extend([
            text_channel(301, "message-log-2024-w08", Some(CATEGORY)),
            text_channel(302, "message-log-2024-w09", Some(CATEGORY)),
        ]);
        let mut config = log_config();
        config.rotation.max_channels = 2;

        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&guild, &config, &transport);

        rotator.send_at(LogPayload::text("entry"), week_10()).await;

        assert_eq!(transport.deleted(), vec![ChannelId::new(301)]);
        let active = rotator.active_channel().await.unwrap();
        assert_eq!(rotator.log_channels().await, vec![ChannelId::new(302), active]);
        assert!(transport
            .notices()
            .iter()
            .any(|n| n.contains("message-log-2024-w08")));
        assert_eq!(transport.logged(), vec![LogPayload::text("entry")]);
    }

    #[tokio::test]
    async fn test_default_config_keeps_archive() {
        let mut guild = standard_guild();
        guild.channels.extend((1..=10).map(|week| {
            text_channel(300 + week, &format!("message-log-2024-w{:02}", week), Some(CATEGORY))
        }));
        let config = log_config();
        assert_eq!(config.rotation.max_channels, RotationConfig::default().max_channels);

        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&guild, &config, &transport);

        rotator.send_at(LogPayload::text("entry"), week_11()).await;

        assert!(transport.deleted().is_empty());
        assert_eq!(transport.created(), vec!["message-log-2024-w11"]);
        assert_eq!(rotator.log_channels().await.len(), 11);
        assert_eq!(transport.logged(), vec![LogPayload::text("entry")]);
    }

    #[tokio::test]
    async fn test_prune_leaves_room_for_other_channels() {
        let mut guild = standard_guild();
        guild.channels.extend(
            (0..48).map(|i| text_channel(400 + i, &format!("archive-{}", i), Some(CATEGORY))),
        );
        guild.channels.extend([
            text_channel(301, "message-log-2024-w08", Some(CATEGORY)),
            text_channel(302, "message-log-2024-w09", Some(CATEGORY)),
        ]);

        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&guild, &log_config(), &transport);

        rotator.send_at(LogPayload::text("entry"), week_10()).await;

        // 48 other channels leave room for two log channels
        assert_eq!(transport.deleted(), vec![ChannelId::new(301)]);
        assert_eq!(rotator.log_channels().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_prune_keeps_channel() {
        let mut guild = standard_guild();
        guild
            .channels
            .push(text_channel(301, "message-log-2024-w08", Some(CATEGORY)));
        let mut config = log_config();
        config.rotation.max_channels = 1;

        let transport = Arc::new(RecordingTransport::new());
        transport.fail_deletes([DiscordError::PermissionDenied {
            message: "Missing Permissions".to_string(),
        }]);
        let rotator = started(&guild, &config, &transport);

        rotator.send_at(LogPayload::text("entry"), week_10()).await;

        assert!(transport.deleted().is_empty());
        assert_eq!(rotator.log_channels().await.len(), 2);
        assert_eq!(transport.logged(), vec![LogPayload::text("entry")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sends_are_serialized() {
        let transport = Arc::new(RecordingTransport::with_send_delay(Duration::from_millis(50)));
        let rotator = started(&standard_guild(), &log_config(), &transport);

        tokio::join!(
            rotator.send_at(LogPayload::text("document"), week_10()),
            rotator.send_at(LogPayload::text("summary"), week_10()),
        );

        assert_eq!(transport.max_concurrent_sends(), 1);
        assert_eq!(
            transport.logged(),
            vec![LogPayload::text("document"), LogPayload::text("summary")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_paced() {
        let mut config = log_config();
        config.rotation.min_send_interval_ms = 500;

        let mut guild = standard_guild();
        guild
            .channels
            .push(text_channel(310, "message-log-2024-w10", Some(CATEGORY)));

        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&guild, &config, &transport);

        let start = Instant::now();
        rotator.send_at(LogPayload::text("one"), week_10()).await;
        rotator.send_at(LogPayload::text("two"), week_10()).await;

        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(transport.logged().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_send_is_retried() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);
        rotator.send_at(LogPayload::text("first"), week_10()).await;

        transport.fail_sends([DiscordError::RateLimited {
            retry_after: Duration::from_secs(2),
        }]);

        let start = Instant::now();
        rotator.send_at(LogPayload::text("second"), week_10()).await;

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            transport.logged(),
            vec![LogPayload::text("first"), LogPayload::text("second")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_give_up_after_max_retries() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);
        rotator.send_at(LogPayload::text("first"), week_10()).await;
        let attempts_before = transport.send_attempts();

        transport.fail_sends((0..4).map(|_| DiscordError::Transient {
            message: "502 Bad Gateway".to_string(),
        }));
        rotator.send_at(LogPayload::text("lost"), week_10()).await;

        // One attempt plus three retries
        assert_eq!(transport.send_attempts() - attempts_before, 4);
        assert_eq!(transport.logged(), vec![LogPayload::text("first")]);

        // The rotator keeps serving the guild
        rotator.send_at(LogPayload::text("after"), week_10()).await;
        assert_eq!(
            transport.logged(),
            vec![LogPayload::text("first"), LogPayload::text("after")]
        );
    }

    #[tokio::test]
    async fn test_missing_channel_is_recreated() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);
        rotator.send_at(LogPayload::text("first"), week_10()).await;
        let original = rotator.active_channel().await.unwrap();

        transport.fail_sends([DiscordError::ChannelNotFound {
            channel_id: original.get(),
        }]);
        rotator.send_at(LogPayload::text("dropped"), week_10()).await;
        assert_eq!(rotator.active_channel().await, None);

        rotator.send_at(LogPayload::text("recovered"), week_10()).await;
        let replacement = rotator.active_channel().await.unwrap();

        assert_ne!(original, replacement);
        assert_eq!(transport.created().len(), 2);
        assert_eq!(
            transport.logged(),
            vec![LogPayload::text("first"), LogPayload::text("recovered")]
        );
    }

    #[tokio::test]
    async fn test_permission_error_drops_without_rotating() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);
        rotator.send_at(LogPayload::text("first"), week_10()).await;
        let channel = rotator.active_channel().await;

        transport.fail_sends([DiscordError::PermissionDenied {
            message: "Missing Access".to_string(),
        }]);
        rotator.send_at(LogPayload::text("dropped"), week_10()).await;

        assert_eq!(rotator.active_channel().await, channel);
        assert_eq!(transport.created().len(), 1);
        assert_eq!(transport.logged(), vec![LogPayload::text("first")]);
    }

    #[tokio::test]
    async fn test_channel_creation_failure_drops_payload() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_creates([DiscordError::PermissionDenied {
            message: "Missing Permissions".to_string(),
        }]);
        let rotator = started(&standard_guild(), &log_config(), &transport);

        rotator.send_at(LogPayload::text("dropped"), week_10()).await;
        assert!(transport.sent().is_empty());
        assert_eq!(rotator.active_channel().await, None);

        rotator.send_at(LogPayload::text("kept"), week_10()).await;
        assert_eq!(transport.logged(), vec![LogPayload::text("kept")]);
    }

    #[tokio::test]
    async fn test_sends_before_start_are_dropped() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator =
            CategoryRotator::resolve(&standard_guild(), &log_config(), transport.clone()).unwrap();

        rotator.send_at(LogPayload::text("early"), week_10()).await;
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_final() {
        let transport = Arc::new(RecordingTransport::new());
        let rotator = started(&standard_guild(), &log_config(), &transport);
        rotator.send_at(LogPayload::text("before"), week_10()).await;

        rotator.stop().await;
        rotator.stop().await;
        assert!(!rotator.is_running());
        assert!(rotator.log_channels().await.is_empty());

        rotator.start();
        assert!(!rotator.is_running());

        rotator.send_at(LogPayload::text("after"), week_10()).await;
        assert_eq!(transport.logged(), vec![LogPayload::text("before")]);
    }
}
