use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{SlotChange, SlotId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-slot state changes (live status displays).
pub struct NotifyHub {
    channels: DashMap<SlotId, broadcast::Sender<SlotChange>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes of one slot. Creates the channel if needed.
    pub fn subscribe(&self, slot_id: &SlotId) -> broadcast::Receiver<SlotChange> {
        self.channels
            .entry(slot_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, change: SlotChange) {
        if let Some(sender) = self.channels.get(&change.slot_id) {
            let _ = sender.send(change);
        }
    }

    /// Drop a slot's channel, e.g. when the slot is removed.
    pub fn remove(&self, slot_id: &SlotId) {
        self.channels.remove(slot_id);
    }
}
