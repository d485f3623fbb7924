use tokio::sync::broadcast;

use crate::model::*;
use crate::store::SlotStore;

use super::validate::normalize_slot_id;
use super::{BookingEngine, EngineError};

impl<S: SlotStore> BookingEngine<S> {
    /// Every slot with its availability, ordered by id.
    pub async fn list_slots(&self) -> Vec<SlotInfo> {
        self.store.list_slots().await
    }

    pub async fn available_slots(&self) -> Vec<SlotId> {
        self.store
            .list_slots()
            .await
            .into_iter()
            .filter(|s| s.available)
            .map(|s| s.slot_id)
            .collect()
    }

    pub async fn occupancy(&self) -> Occupancy {
        let slots = self.store.list_slots().await;
        let available = slots.iter().filter(|s| s.available).count();
        Occupancy {
            total: slots.len(),
            available,
            occupied: slots.len() - available,
        }
    }

    /// The full audit trail, oldest first.
    pub async fn bookings(&self) -> Vec<BookingRecord> {
        self.store.list_bookings().await
    }

    /// Booking history of one slot. Works for removed slots too.
    pub async fn bookings_for_slot(&self, slot_id_raw: &str) -> Result<Vec<BookingRecord>, EngineError> {
        let slot_id = normalize_slot_id(slot_id_raw)?;
        Ok(self
            .store
            .list_bookings()
            .await
            .into_iter()
            .filter(|b| b.slot_id == slot_id)
            .collect())
    }

    /// Active bookings whose user name matches, ignoring case.
    pub async fn find_active_by_user(&self, user_name: &str) -> Vec<BookingRecord> {
        let wanted = user_name.trim();
        self.store
            .list_bookings()
            .await
            .into_iter()
            .filter(|b| b.status == BookingStatus::Active && b.user_name.eq_ignore_ascii_case(wanted))
            .collect()
    }

    /// Subscribe to changes of an existing slot. The stream closes when the
    /// slot is removed.
    pub async fn watch(&self, slot_id_raw: &str) -> Result<(SlotId, broadcast::Receiver<SlotChange>), EngineError> {
        let slot_id = self.validate_slot(slot_id_raw).await?;
        // Under the lock so a concurrent remove cannot leave us on a dead channel.
        let _guard = self.lock_slot(&slot_id).await;
        if self.store.get_status(&slot_id).await.is_none() {
            return Err(EngineError::SlotNotFound(slot_id));
        }
        let rx = self.notify.subscribe(&slot_id);
        Ok((slot_id, rx))
    }
}
