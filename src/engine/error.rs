use crate::model::{BookingId, SlotId};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or disallowed input.
    Validation(&'static str),
    LimitExceeded(&'static str),
    SlotNotFound(SlotId),
    /// Unknown, malformed, or already released.
    BookingNotFound(String),
    /// The slot was occupied when checked under its lock.
    Conflict(SlotId),
    AlreadyExists(SlotId),
    /// A freshly generated booking id matched an existing record.
    IdCollision(BookingId),
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(reason) => write!(f, "invalid input: {reason}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::SlotNotFound(id) => write!(f, "slot '{id}' does not exist"),
            EngineError::BookingNotFound(id) => {
                write!(f, "booking '{id}' not found or already released")
            }
            EngineError::Conflict(id) => write!(f, "slot {id} is already occupied"),
            EngineError::AlreadyExists(id) => write!(f, "slot {id} already exists"),
            EngineError::IdCollision(id) => write!(f, "generated booking id {id} collides with an existing booking"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotNotFound(id) => EngineError::SlotNotFound(id),
            StoreError::SlotExists(id) => EngineError::AlreadyExists(id),
            StoreError::SlotOccupied(id) => EngineError::Conflict(id),
            StoreError::BookingNotFound(id) => EngineError::BookingNotFound(id.to_string()),
            StoreError::DuplicateBooking(id) => EngineError::IdCollision(id),
            StoreError::TooManySlots => EngineError::LimitExceeded("too many slots"),
        }
    }
}
