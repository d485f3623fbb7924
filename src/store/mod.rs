mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::{BookingIdGen, MemoryStore};

use async_trait::async_trait;

use crate::model::*;

/// Whether a write that the store accepted also reached durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Durability {
    Committed,
    /// Applied to the store's live state, but the durable write failed.
    Unconfirmed(String),
}

impl Durability {
    pub fn is_committed(&self) -> bool {
        matches!(self, Durability::Committed)
    }

    /// Combine two writes of one operation; the first failure wins.
    pub fn and(self, other: Durability) -> Durability {
        match self {
            Durability::Committed => other,
            unconfirmed => unconfirmed,
        }
    }
}

/// A write the store refused. Nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    SlotNotFound(SlotId),
    SlotExists(SlotId),
    SlotOccupied(SlotId),
    BookingNotFound(BookingId),
    DuplicateBooking(BookingId),
    TooManySlots,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::SlotNotFound(id) => write!(f, "slot {id} not found"),
            StoreError::SlotExists(id) => write!(f, "slot {id} already exists"),
            StoreError::SlotOccupied(id) => write!(f, "slot {id} is occupied"),
            StoreError::BookingNotFound(id) => write!(f, "booking {id} not found"),
            StoreError::DuplicateBooking(id) => write!(f, "booking id {id} already in use"),
            StoreError::TooManySlots => write!(f, "slot limit reached"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistent ledger of slots and bookings.
///
/// Every call is atomic on its own. Nothing spans calls: a read followed by
/// a write is only safe while the caller holds that slot's lock.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// `None` if the slot does not exist.
    async fn get_status(&self, slot_id: &SlotId) -> Option<bool>;

    /// Set availability and stamp `last_updated`.
    async fn set_status(&self, slot_id: &SlotId, available: bool)
    -> Result<Durability, StoreError>;

    /// Generate a booking id and insert an ACTIVE record. Fails with
    /// `DuplicateBooking` rather than overwrite an existing record.
    async fn create_booking(
        &self,
        slot_id: &SlotId,
        user_name: &str,
    ) -> Result<(BookingId, Durability), StoreError>;

    /// Slot and user of an ACTIVE booking; `None` for unknown or completed ids.
    async fn get_active_booking(&self, booking_id: &BookingId) -> Option<(SlotId, String)>;

    async fn set_booking_status(
        &self,
        booking_id: &BookingId,
        status: BookingStatus,
    ) -> Result<Durability, StoreError>;

    async fn active_booking_for_slot(&self, slot_id: &SlotId) -> Option<BookingId>;

    /// All slots ordered by id.
    async fn list_slots(&self) -> Vec<SlotInfo>;

    /// All booking records in creation order.
    async fn list_bookings(&self) -> Vec<BookingRecord>;

    /// Register a new, available slot.
    async fn insert_slot(&self, slot_id: &SlotId) -> Result<Durability, StoreError>;

    /// Remove an available slot. Its booking history is kept.
    async fn delete_slot(&self, slot_id: &SlotId) -> Result<Durability, StoreError>;
}
