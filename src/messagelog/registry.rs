//! Guild id → category rotator map.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::GuildId;
use tokio::sync::RwLock;
use tracing::info;

use crate::messagelog::rotator::CategoryRotator;

/// Holds at most one rotator per guild.
#[derive(Default)]
pub struct RotatorRegistry {
    rotators: RwLock<HashMap<GuildId, Arc<CategoryRotator>>>,
}

impl RotatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rotator, stopping the one it replaces.
    pub async fn insert(&self, rotator: Arc<CategoryRotator>) {
        let guild_id = rotator.guild_id();
        let previous = self.rotators.write().await.insert(guild_id, rotator);

        if let Some(previous) = previous {
            info!(guild_id = %guild_id, "Replacing existing message log rotator");
            previous.stop().await;
        }
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<CategoryRotator>> {
        self.rotators.read().await.get(&guild_id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rotators.read().await.len()
    }

    /// Remove every rotator, returning them so the caller can stop them.
    pub async fn drain(&self) -> Vec<Arc<CategoryRotator>> {
        self.rotators.write().await.drain().map(|(_, rotator)| rotator).collect()
    }
}
