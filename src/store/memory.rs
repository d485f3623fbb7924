use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::limits::MAX_SLOTS;
use crate::model::*;

use super::{Durability, SlotStore, StoreError};

/// Source of fresh booking identifiers.
pub type BookingIdGen = Arc<dyn Fn() -> BookingId + Send + Sync>;

/// In-process slot and booking tables. Every mutation is expressed as an
/// [`Event`] and goes through [`MemoryStore::apply`], so the WAL-backed store
/// can replay the exact same transitions.
pub struct MemoryStore {
    slots: DashMap<SlotId, SlotState>,
    /// Records tagged with their creation order.
    bookings: DashMap<BookingId, (u64, BookingRecord)>,
    next_seq: AtomicU64,
    /// Reserved before a slot is inserted so concurrent adds cannot pass `MAX_SLOTS`.
    live_slots: AtomicUsize,
    /// Reverse lookup: slot → its ACTIVE booking.
    active_by_slot: DashMap<SlotId, BookingId>,
    id_gen: BookingIdGen,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_id_gen(Arc::new(BookingId::generate))
    }

    pub fn with_id_gen(id_gen: BookingIdGen) -> Self {
        Self {
            slots: DashMap::new(),
            bookings: DashMap::new(),
            next_seq: AtomicU64::new(0),
            live_slots: AtomicUsize::new(0),
            active_by_slot: DashMap::new(),
            id_gen,
        }
    }

    /// Convenience for seeding: a store holding `ids`, all available.
    pub fn with_slots<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for id in ids {
            let _ = store.apply(&Event::SlotAdded { slot_id: SlotId::new(id), at: now_ms() });
        }
        store
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    // ── Event construction ───────────────────────────────────

    pub(crate) fn slot_added(&self, slot_id: &SlotId) -> Event {
        Event::SlotAdded { slot_id: slot_id.clone(), at: now_ms() }
    }

    pub(crate) fn booking_created(
        &self,
        slot_id: &SlotId,
        user_name: &str,
    ) -> Result<(BookingId, Event), StoreError> {
        if !self.slots.contains_key(slot_id) {
            return Err(StoreError::SlotNotFound(slot_id.clone()));
        }
        let booking_id = (self.id_gen)();
        let event = Event::BookingCreated {
            booking_id: booking_id.clone(),
            slot_id: slot_id.clone(),
            user_name: user_name.to_string(),
            at: now_ms(),
        };
        Ok((booking_id, event))
    }

    // ── Event application ────────────────────────────────────

    /// Apply one event atomically. Rejected events leave the tables untouched.
    pub(crate) fn apply(&self, event: &Event) -> Result<(), StoreError> {
        match event {
            Event::SlotAdded { slot_id, at } => match self.slots.entry(slot_id.clone()) {
                Entry::Occupied(_) => Err(StoreError::SlotExists(slot_id.clone())),
                Entry::Vacant(v) => {
                    self.live_slots
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                            (n < MAX_SLOTS).then_some(n + 1)
                        })
                        .map_err(|_| StoreError::TooManySlots)?;
                    v.insert(SlotState { available: true, last_updated: *at });
                    Ok(())
                }
            },
            Event::SlotRemoved { slot_id } => {
                if self.slots.remove_if(slot_id, |_, s| s.available).is_some() {
                    self.live_slots.fetch_sub(1, Ordering::AcqRel);
                    Ok(())
                } else if self.slots.contains_key(slot_id) {
                    Err(StoreError::SlotOccupied(slot_id.clone()))
                } else {
                    Err(StoreError::SlotNotFound(slot_id.clone()))
                }
            }
            Event::SlotStatusSet { slot_id, available, at } => {
                let mut state = self
                    .slots
                    .get_mut(slot_id)
                    .ok_or_else(|| StoreError::SlotNotFound(slot_id.clone()))?;
                state.available = *available;
                state.last_updated = *at;
                Ok(())
            }
            Event::BookingCreated { booking_id, slot_id, user_name, at } => {
                match self.bookings.entry(booking_id.clone()) {
                    Entry::Occupied(_) => return Err(StoreError::DuplicateBooking(booking_id.clone())),
                    Entry::Vacant(v) => {
                        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                        v.insert((
                            seq,
                            BookingRecord {
                                booking_id: booking_id.clone(),
                                slot_id: slot_id.clone(),
                                user_name: user_name.clone(),
                                booking_time: *at,
                                status: BookingStatus::Active,
                            },
                        ));
                    }
                }
                self.active_by_slot.insert(slot_id.clone(), booking_id.clone());
                Ok(())
            }
            Event::BookingStatusSet { booking_id, status } => {
                let mut entry = self
                    .bookings
                    .get_mut(booking_id)
                    .ok_or_else(|| StoreError::BookingNotFound(booking_id.clone()))?;
                let record = &mut entry.1;
                record.status = *status;
                match status {
                    BookingStatus::Active => {
                        self.active_by_slot.insert(record.slot_id.clone(), booking_id.clone());
                    }
                    BookingStatus::Completed => {
                        self.active_by_slot.remove_if(&record.slot_id, |_, b| b == booking_id);
                    }
                }
                Ok(())
            }
        }
    }

    /// The shortest event sequence that rebuilds the current tables.
    /// Booking records are all kept; intermediate status flips are not.
    pub(crate) fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for info in self.sorted_slots() {
            events.push(Event::SlotAdded { slot_id: info.slot_id.clone(), at: info.last_updated });
            if !info.available {
                events.push(Event::SlotStatusSet {
                    slot_id: info.slot_id,
                    available: false,
                    at: info.last_updated,
                });
            }
        }

        for record in self.sorted_bookings() {
            events.push(Event::BookingCreated {
                booking_id: record.booking_id.clone(),
                slot_id: record.slot_id,
                user_name: record.user_name,
                at: record.booking_time,
            });
            if record.status == BookingStatus::Completed {
                events.push(Event::BookingStatusSet {
                    booking_id: record.booking_id,
                    status: BookingStatus::Completed,
                });
            }
        }

        events
    }

    fn commit(&self, event: Event) -> Result<Durability, StoreError> {
        self.apply(&event)?;
        Ok(Durability::Committed)
    }

    fn sorted_slots(&self) -> Vec<SlotInfo> {
        let mut slots: Vec<SlotInfo> = self
            .slots
            .iter()
            .map(|e| SlotInfo {
                slot_id: e.key().clone(),
                available: e.value().available,
                last_updated: e.value().last_updated,
            })
            .collect();
        slots.sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
        slots
    }

    fn sorted_bookings(&self) -> Vec<BookingRecord> {
        let mut bookings: Vec<(u64, BookingRecord)> = self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|(seq, _)| *seq);
        bookings.into_iter().map(|(_, record)| record).collect()
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn get_status(&self, slot_id: &SlotId) -> Option<bool> {
        self.slots.get(slot_id).map(|s| s.available)
    }

    async fn set_status(&self, slot_id: &SlotId, available: bool) -> Result<Durability, StoreError> {
        self.commit(Event::SlotStatusSet { slot_id: slot_id.clone(), available, at: now_ms() })
    }

    async fn create_booking(
        &self,
        slot_id: &SlotId,
        user_name: &str,
    ) -> Result<(BookingId, Durability), StoreError> {
        let (booking_id, event) = self.booking_created(slot_id, user_name)?;
        let durability = self.commit(event)?;
        Ok((booking_id, durability))
    }

    async fn get_active_booking(&self, booking_id: &BookingId) -> Option<(SlotId, String)> {
        self.bookings
            .get(booking_id)
            .filter(|e| e.1.status == BookingStatus::Active)
            .map(|e| (e.1.slot_id.clone(), e.1.user_name.clone()))
    }

    async fn set_booking_status(
        &self,
        booking_id: &BookingId,
        status: BookingStatus,
    ) -> Result<Durability, StoreError> {
        self.commit(Event::BookingStatusSet { booking_id: booking_id.clone(), status })
    }

    async fn active_booking_for_slot(&self, slot_id: &SlotId) -> Option<BookingId> {
        self.active_by_slot.get(slot_id).map(|e| e.value().clone())
    }

    async fn list_slots(&self) -> Vec<SlotInfo> {
        self.sorted_slots()
    }

    async fn list_bookings(&self) -> Vec<BookingRecord> {
        self.sorted_bookings()
    }

    async fn insert_slot(&self, slot_id: &SlotId) -> Result<Durability, StoreError> {
        self.commit(self.slot_added(slot_id))
    }

    async fn delete_slot(&self, slot_id: &SlotId) -> Result<Durability, StoreError> {
        self.commit(Event::SlotRemoved { slot_id: slot_id.clone() })
    }
}
