//! Platform event handlers.
//!
//! Each handler filters out guilds the log isn't active in, builds the report
//! payloads and queues them in posting order. Handlers never talk to a
//! rotator directly.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serenity::model::id::GuildId;
use tracing::{debug, info, warn};

use crate::common::GuildSnapshot;
use crate::messagelog::payload::{LogMessage, LogPayload};
use crate::messagelog::pipeline::MessageLog;
use crate::messagelog::reports::{
    bulk_deletion_report, deletion_report, edit_report, BulkDeletedMessages, DeletedMessage,
    EditedMessage,
};
use crate::messagelog::transport::LogTransport;

/// Guilds the message log is active in.
#[derive(Debug, Clone, Default)]
pub struct GuildFilter {
    allowed: HashSet<GuildId>,
}

impl GuildFilter {
    /// Allow only the given guilds. An empty list allows every guild.
    pub fn new(guild_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            allowed: guild_ids
                .into_iter()
                .filter(|id| *id != 0)
                .map(GuildId::new)
                .collect(),
        }
    }

    pub fn allows(&self, guild_id: GuildId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&guild_id)
    }
}

pub struct LogEventHandlers {
    log: Arc<MessageLog>,
    filter: GuildFilter,
}

impl LogEventHandlers {
    pub fn new(log: Arc<MessageLog>, filter: GuildFilter) -> Self {
        Self { log, filter }
    }

    pub fn filter(&self) -> &GuildFilter {
        &self.filter
    }

    /// A guild became available: set up its rotator.
    pub async fn guild_available(&self, guild: &GuildSnapshot, transport: Arc<dyn LogTransport>) {
        if !self.filter.allows(guild.id) {
            debug!(guild_id = %guild.id, "Guild '{}' not in scope for the message log", guild.name);
            return;
        }

        match self.log.register_guild(guild, transport).await {
            Ok(()) => info!(guild_id = %guild.id, "Message log ready for '{}'", guild.name),
            Err(e) => warn!(
                guild_id = %guild.id,
                "Message log misconfigured for '{}': {}",
                guild.name,
                e
            ),
        }
    }

    pub async fn message_deleted(&self, event: DeletedMessage) {
        if !self.filter.allows(event.guild_id) {
            return;
        }

        let payloads = deletion_report(&event, Utc::now());
        self.enqueue_all(event.guild_id, payloads).await;
    }

    pub async fn messages_bulk_deleted(&self, event: BulkDeletedMessages) {
        if !self.filter.allows(event.guild_id) {
            return;
        }

        let payloads = bulk_deletion_report(&event, Utc::now());
        self.enqueue_all(event.guild_id, payloads).await;
    }

    pub async fn message_edited(&self, event: EditedMessage) {
        if !self.filter.allows(event.guild_id) {
            return;
        }

        let payloads = edit_report(&event, Utc::now());
        if payloads.is_empty() {
            debug!(
                guild_id = %event.guild_id,
                "Message {} edited without content change",
                event.new.id
            );
            return;
        }
        self.enqueue_all(event.guild_id, payloads).await;
    }

    /// Queue payloads one after another so they keep their order.
    async fn enqueue_all(&self, guild_id: GuildId, payloads: Vec<LogPayload>) {
        for payload in payloads {
            if let Err(e) = self.log.send(LogMessage::new(guild_id, payload)).await {
                warn!(guild_id = %guild_id, "Dropping log message: {}", e);
                return;
            }
        }
    }
}
