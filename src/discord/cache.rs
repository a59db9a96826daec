//! Recent guild messages, kept so delete and edit reports can show what a
//! message looked like.
//!
//! Serenity evicts a message from its own cache before the delete event
//! reaches us, so the bot keeps this separate bounded copy.

use std::collections::{HashMap, VecDeque};

use serenity::model::id::{ChannelId, MessageId};

use crate::common::MessageSnapshot;

/// Bounded per-channel message cache; the oldest message in a channel is
/// evicted once the channel holds `capacity_per_channel` messages.
pub struct MessageCache {
    capacity_per_channel: usize,
    channels: HashMap<ChannelId, VecDeque<MessageSnapshot>>,
}

impl MessageCache {
    pub fn new(capacity_per_channel: usize) -> Self {
        Self {
            capacity_per_channel,
            channels: HashMap::new(),
        }
    }

    pub fn insert(&mut self, message: MessageSnapshot) {
        if self.capacity_per_channel == 0 {
            return;
        }

        let channel = self.channels.entry(message.channel_id).or_default();
        channel.retain(|m| m.id != message.id);
        if channel.len() >= self.capacity_per_channel {
            channel.pop_front();
        }
        channel.push_back(message);
    }

    /// Store the new version of a message, returning the previous one.
    pub fn update(&mut self, message: MessageSnapshot) -> Option<MessageSnapshot> {
        let previous = self
            .channels
            .get_mut(&message.channel_id)
            .and_then(|channel| {
                channel
                    .iter_mut()
                    .find(|m| m.id == message.id)
                    .map(|slot| std::mem::replace(slot, message.clone()))
            });

        if previous.is_none() {
            self.insert(message);
        }
        previous
    }

    pub fn get(&self, channel_id: ChannelId, message_id: MessageId) -> Option<&MessageSnapshot> {
        self.channels
            .get(&channel_id)?
            .iter()
            .find(|m| m.id == message_id)
    }

    pub fn remove(
        &mut self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Option<MessageSnapshot> {
        let channel = self.channels.get_mut(&channel_id)?;
        let index = channel.iter().position(|m| m.id == message_id)?;
        let message = channel.remove(index);

        if channel.is_empty() {
            self.channels.remove(&channel_id);
        }
        message
    }

    /// Remove every listed message that is cached.
    pub fn remove_many(
        &mut self,
        channel_id: ChannelId,
        message_ids: &[MessageId],
    ) -> Vec<MessageSnapshot> {
        message_ids
            .iter()
            .filter_map(|id| self.remove(channel_id, *id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.values().map(VecDeque::len).sum()
    }
}
