//! Connection registry: which live channels each resident has.
//!
//! Two maps. `residents` holds the per-resident channel sets that lookups
//! read, `index` maps a channel id back to its resident so `unregister`
//! needs only the id. Mutations for one resident take that resident's shard
//! lock; different residents never block each other. Nothing here awaits or
//! does I/O, and no method holds a guard from one map while touching the
//! other.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;

use super::channel::Channel;

pub struct ConnectionRegistry {
    residents: DashMap<i64, HashMap<String, Arc<Channel>>>,
    index: DashMap<String, i64>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            residents: DashMap::new(),
            index: DashMap::new(),
        })
    }

    /// Add `channel` under its resident and mark it live.
    ///
    /// Registering an id again replaces the previous entry; if the id was
    /// filed under another resident it moves. The returned handle
    /// unregisters the channel when closed or dropped.
    pub fn register(self: &Arc<Self>, channel: Arc<Channel>) -> ChannelHandle {
        let id = channel.id().to_string();
        let resident_id = channel.resident_id();

        let replaced = self
            .residents
            .entry(resident_id)
            .or_default()
            .insert(id.clone(), channel.clone());

        let moved = match self.index.insert(id.clone(), resident_id) {
            Some(previous) if previous != resident_id => self.remove_from_set(previous, &id),
            _ => None,
        };

        for displaced in replaced.into_iter().chain(moved) {
            if !Arc::ptr_eq(&displaced, &channel) {
                displaced.begin_close();
                displaced.mark_closed();
                tracing::info!(channel_id = %id, "superseded channel closed");
            }
        }

        channel.mark_live();
        tracing::info!(channel_id = %id, resident_id, "channel registered");

        ChannelHandle {
            channel,
            registry: Arc::downgrade(self),
            released: false,
        }
    }

    /// Remove a channel from whichever resident holds it. Returns whether
    /// anything was removed; a second call for the same id is a no-op.
    pub fn unregister(&self, channel_id: &str) -> bool {
        let Some((_, resident_id)) = self.index.remove(channel_id) else {
            return false;
        };

        match self.remove_from_set(resident_id, channel_id) {
            Some(channel) => {
                channel.begin_close();
                channel.mark_closed();
                tracing::info!(channel_id, resident_id, "channel unregistered");
                true
            }
            None => false,
        }
    }

    /// Unregister `channel` only while it is still the entry filed under its
    /// id. A channel superseded by a later registration of the same id
    /// leaves its replacement in place.
    pub fn unregister_channel(&self, channel: &Arc<Channel>) -> bool {
        let id = channel.id();
        let Some(resident_id) = self.index.get(id).map(|entry| *entry.value()) else {
            return false;
        };

        let removed = self
            .residents
            .get_mut(&resident_id)
            .map(|mut set| {
                let current = set
                    .get(id)
                    .is_some_and(|stored| Arc::ptr_eq(stored, channel));
                if current {
                    set.remove(id);
                }
                current
            })
            .unwrap_or(false);
        if !removed {
            return false;
        }

        self.residents.remove_if(&resident_id, |_, set| set.is_empty());
        self.index.remove_if(id, |_, owner| *owner == resident_id);
        channel.begin_close();
        channel.mark_closed();
        tracing::info!(channel_id = id, resident_id, "channel unregistered");
        true
    }

    /// Point-in-time snapshot of a resident's live channels.
    pub fn channels_for(&self, resident_id: i64) -> Vec<Arc<Channel>> {
        self.residents
            .get(&resident_id)
            .map(|set| set.values().filter(|ch| ch.is_live()).cloned().collect())
            .unwrap_or_default()
    }

    /// Unregister every channel idle for longer than `max_idle`.
    pub fn sweep_stale(&self, max_idle: Duration) -> usize {
        let stale: Vec<String> = self
            .residents
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .values()
                    .filter(|ch| ch.idle_for() > max_idle)
                    .map(|ch| ch.id().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();

        stale.iter().filter(|id| self.unregister(id)).count()
    }

    pub fn connection_count(&self) -> usize {
        self.index.len()
    }

    /// Residents with at least one registered channel.
    pub fn resident_count(&self) -> usize {
        self.residents.len()
    }

    /// Unregister everything. Used at shutdown.
    pub fn clear(&self) -> usize {
        let ids: Vec<String> = self.index.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.unregister(id)).count()
    }

    fn remove_from_set(&self, resident_id: i64, channel_id: &str) -> Option<Arc<Channel>> {
        let removed = self
            .residents
            .get_mut(&resident_id)
            .and_then(|mut set| set.remove(channel_id));
        self.residents.remove_if(&resident_id, |_, set| set.is_empty());
        removed
    }
}

/// Registration guard for one channel.
pub struct ChannelHandle {
    channel: Arc<Channel>,
    registry: Weak<ConnectionRegistry>,
    released: bool,
}

impl ChannelHandle {
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Unregister now rather than at drop.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister_channel(&self.channel);
        }
        self.channel.begin_close();
        self.channel.mark_closed();
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.release();
    }
}
