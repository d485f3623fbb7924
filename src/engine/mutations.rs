use tracing::{debug, error, info, warn};

use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, RELEASES_TOTAL, outcome_label};
use crate::store::{Durability, SlotStore};

use super::validate::{check_new_slot_id, normalize_booking_id, normalize_slot_id, normalize_user_name};
use super::{Booked, BookingEngine, EngineError, Released, warn_unconfirmed};

impl<S: SlotStore> BookingEngine<S> {
    /// Reserve a slot for `user_name` (blank books as `Guest`).
    pub async fn book(&self, slot_id_raw: &str, user_name: &str) -> Result<Booked, EngineError> {
        let result = self.try_book(slot_id_raw, user_name).await;
        let outcome = match &result {
            Ok(b) if b.is_degraded() => "degraded",
            _ => outcome_label(&result),
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        match &result {
            Ok(b) => info!("booked slot {} for {} as {}", b.slot_id, b.user_name, b.booking_id),
            Err(e) => debug!("book {slot_id_raw:?} rejected: {e}"),
        }
        result
    }

    async fn try_book(&self, slot_id_raw: &str, user_name: &str) -> Result<Booked, EngineError> {
        let slot_id = self.validate_slot(slot_id_raw).await?;
        let user_name = normalize_user_name(user_name)?;

        let _guard = self.lock_slot(&slot_id).await;

        // Any status read before the lock is stale.
        match self.store.get_status(&slot_id).await {
            None => return Err(EngineError::SlotNotFound(slot_id)),
            Some(false) => return Err(EngineError::Conflict(slot_id)),
            Some(true) => {}
        }

        let occupied = self.store.set_status(&slot_id, false).await?;
        let (booking_id, created) = match self.store.create_booking(&slot_id, &user_name).await {
            Ok(created) => created,
            Err(e) => {
                // An occupied slot must always have an active booking.
                if let Err(undo) = self.store.set_status(&slot_id, true).await {
                    error!("could not restore slot {slot_id} after failed booking: {undo}");
                }
                return Err(e.into());
            }
        };

        let durability = occupied.and(created);
        warn_unconfirmed("book", &slot_id, &durability);
        self.publish(&slot_id, Some(&booking_id), false);

        Ok(Booked {
            booking_id,
            slot_id,
            user_name,
            durability,
        })
    }

    /// Release the slot held by an active booking. Unknown, malformed and
    /// already-released ids all fail the same way.
    pub async fn release(&self, booking_id_raw: &str) -> Result<Released, EngineError> {
        let result = self.try_release(booking_id_raw).await;
        let outcome = match &result {
            Ok(r) if r.is_degraded() => "degraded",
            _ => outcome_label(&result),
        };
        metrics::counter!(RELEASES_TOTAL, "outcome" => outcome).increment(1);
        match &result {
            Ok(r) => info!("released slot {} from booking {}", r.slot_id, r.booking_id),
            Err(e) => debug!("release {booking_id_raw:?} rejected: {e}"),
        }
        result
    }

    async fn try_release(&self, booking_id_raw: &str) -> Result<Released, EngineError> {
        let booking_id = normalize_booking_id(booking_id_raw)?;
        let not_found = || EngineError::BookingNotFound(booking_id.to_string());

        let (slot_id, _) = self
            .store
            .get_active_booking(&booking_id)
            .await
            .ok_or_else(not_found)?;

        let _guard = self.lock_slot(&slot_id).await;

        // Another release of the same booking may have won while we waited.
        let (slot_id, user_name) = self
            .store
            .get_active_booking(&booking_id)
            .await
            .ok_or_else(not_found)?;

        let freed = self.store.set_status(&slot_id, true).await?;
        let completed = self
            .store
            .set_booking_status(&booking_id, BookingStatus::Completed)
            .await?;

        let durability = freed.and(completed);
        warn_unconfirmed("release", &slot_id, &durability);
        self.publish(&slot_id, Some(&booking_id), true);

        Ok(Released {
            booking_id,
            slot_id,
            user_name,
            durability,
        })
    }

    // ── Administration ───────────────────────────────────────

    /// Register a new, available slot.
    pub async fn add_slot(&self, slot_id_raw: &str) -> Result<(SlotId, Durability), EngineError> {
        let slot_id = normalize_slot_id(slot_id_raw)?;
        check_new_slot_id(&slot_id)?;

        let _guard = self.lock_slot(&slot_id).await;
        let durability = self.store.insert_slot(&slot_id).await?;
        warn_unconfirmed("add", &slot_id, &durability);
        info!("added slot {slot_id}");
        Ok((slot_id, durability))
    }

    /// Remove an available slot. Refused while the slot is occupied.
    pub async fn remove_slot(&self, slot_id_raw: &str) -> Result<Durability, EngineError> {
        let slot_id = self.validate_slot(slot_id_raw).await?;

        let _guard = self.lock_slot(&slot_id).await;
        match self.store.get_status(&slot_id).await {
            None => return Err(EngineError::SlotNotFound(slot_id)),
            Some(false) => return Err(EngineError::Conflict(slot_id)),
            Some(true) => {}
        }
        let durability = self.store.delete_slot(&slot_id).await?;
        warn_unconfirmed("remove", &slot_id, &durability);
        self.notify.remove(&slot_id);
        info!("removed slot {slot_id}");
        Ok(durability)
    }

    /// Free every occupied slot, completing its active booking. Slots are
    /// visited in id order, each under its own lock.
    pub async fn release_all(&self) -> Result<Vec<Released>, EngineError> {
        let mut released = Vec::new();

        for slot in self.store.list_slots().await {
            if slot.available {
                continue;
            }
            let slot_id = slot.slot_id;
            let _guard = self.lock_slot(&slot_id).await;
            if self.store.get_status(&slot_id).await != Some(false) {
                continue;
            }

            let active = match self.store.active_booking_for_slot(&slot_id).await {
                Some(booking_id) => {
                    let user_name = self
                        .store
                        .get_active_booking(&booking_id)
                        .await
                        .map(|(_, user)| user)
                        .unwrap_or_default();
                    Some((booking_id, user_name))
                }
                None => None,
            };

            let freed = self.store.set_status(&slot_id, true).await?;
            match active {
                Some((booking_id, user_name)) => {
                    let completed = self
                        .store
                        .set_booking_status(&booking_id, BookingStatus::Completed)
                        .await?;
                    let durability = freed.and(completed);
                    warn_unconfirmed("reset", &slot_id, &durability);
                    self.publish(&slot_id, Some(&booking_id), true);
                    released.push(Released {
                        booking_id,
                        slot_id,
                        user_name,
                        durability,
                    });
                }
                None => {
                    warn!("slot {slot_id} was occupied without an active booking");
                    warn_unconfirmed("reset", &slot_id, &freed);
                    self.publish(&slot_id, None, true);
                }
            }
        }

        info!("reset released {} bookings", released.len());
        Ok(released)
    }
}
