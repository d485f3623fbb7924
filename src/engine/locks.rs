use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::SlotId;

pub type SlotLock = Arc<Mutex<()>>;

/// One exclusive lock per slot, created on first use and kept for the
/// lifetime of the registry.
///
/// Creation goes through the map's insert-if-absent, which holds a shard
/// lock only for the insert itself, never while a slot lock is held.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<SlotId, SlotLock>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, slot_id: &SlotId) -> SlotLock {
        if let Some(lock) = self.locks.get(slot_id) {
            return lock.value().clone();
        }
        let lock = self
            .locks
            .entry(slot_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        metrics::gauge!(crate::observability::SLOT_LOCKS).set(self.locks.len() as f64);
        lock
    }

    pub fn contains(&self, slot_id: &SlotId) -> bool {
        self.locks.contains_key(slot_id)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
