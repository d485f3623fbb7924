mod error;
mod locks;
mod mutations;
mod queries;
mod validate;

pub use error::EngineError;
pub use locks::{LockRegistry, SlotLock};

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OwnedMutexGuard;
use tracing::warn;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::{Durability, SlotStore};

/// A successful booking. `durability` is `Unconfirmed` when the decision was
/// made under the slot lock but the store could not confirm the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booked {
    pub booking_id: BookingId,
    pub slot_id: SlotId,
    pub user_name: String,
    pub durability: Durability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub booking_id: BookingId,
    pub slot_id: SlotId,
    pub user_name: String,
    pub durability: Durability,
}

impl Booked {
    pub fn is_degraded(&self) -> bool {
        !self.durability.is_committed()
    }
}

impl Released {
    pub fn is_degraded(&self) -> bool {
        !self.durability.is_committed()
    }
}

/// Books and releases slots. Every check-then-write on a slot runs while
/// holding that slot's lock, so per slot all operations are totally ordered
/// and distinct slots never wait on each other.
///
/// Only correct if every writer of the store goes through this engine.
pub struct BookingEngine<S> {
    store: Arc<S>,
    locks: LockRegistry,
    notify: Arc<NotifyHub>,
}

impl<S: SlotStore> BookingEngine<S> {
    pub fn new(store: Arc<S>, locks: LockRegistry, notify: Arc<NotifyHub>) -> Self {
        Self { store, locks, notify }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    pub fn get_or_create_lock(&self, slot_id: &SlotId) -> SlotLock {
        self.locks.get_or_create(slot_id)
    }

    /// Normalize `input` and confirm the slot exists. Never creates a lock.
    pub async fn validate_slot(&self, input: &str) -> Result<SlotId, EngineError> {
        let slot_id = validate::normalize_slot_id(input)?;
        if self.store.get_status(&slot_id).await.is_none() {
            return Err(EngineError::SlotNotFound(slot_id));
        }
        Ok(slot_id)
    }

    /// Acquire the slot's lock. The guard releases it on every exit path.
    pub(super) async fn lock_slot(&self, slot_id: &SlotId) -> OwnedMutexGuard<()> {
        let lock = self.locks.get_or_create(slot_id);
        let wait_start = Instant::now();
        let guard = lock.lock_owned().await;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());
        guard
    }

    pub(super) fn publish(&self, slot_id: &SlotId, booking_id: Option<&BookingId>, available: bool) {
        self.notify.send(SlotChange {
            slot_id: slot_id.clone(),
            booking_id: booking_id.cloned(),
            available,
            at: now_ms(),
        });
    }
}

/// Log a decision whose write the store could not confirm.
fn warn_unconfirmed(op: &str, slot_id: &SlotId, durability: &Durability) {
    if let Durability::Unconfirmed(reason) = durability {
        warn!("{op} on slot {slot_id} applied but not confirmed durable: {reason}");
    }
}
