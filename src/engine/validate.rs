use crate::limits::*;
use crate::model::{BookingId, DEFAULT_USER_NAME, SlotId};

use super::EngineError;

/// Sequences that mean something to a query language. Rejected in every
/// identifier no matter what the store does with them.
const RESERVED: [&str; 5] = ["'", "\"", ";", "--", "/*"];

fn has_reserved(s: &str) -> bool {
    RESERVED.iter().any(|r| s.contains(r))
}

/// Trim and uppercase a slot id, rejecting empty, reserved, or over-long input.
/// Existence is checked separately against the store.
pub(crate) fn normalize_slot_id(input: &str) -> Result<SlotId, EngineError> {
    let normalized = input.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(EngineError::Validation("slot id cannot be empty"));
    }
    if has_reserved(&normalized) {
        return Err(EngineError::Validation("invalid characters in slot id"));
    }
    if normalized.len() > MAX_SLOT_ID_LEN {
        return Err(EngineError::LimitExceeded("slot id too long"));
    }
    Ok(SlotId::new(normalized))
}

/// Stricter check for ids of slots being created: `[A-Z0-9_-]` only.
pub(crate) fn check_new_slot_id(slot_id: &SlotId) -> Result<(), EngineError> {
    let ok = slot_id
        .as_str()
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !ok {
        return Err(EngineError::Validation("slot id may only contain letters, digits, '-' and '_'"));
    }
    Ok(())
}

/// Trim and uppercase a booking id. Empty input resolves to no booking
/// rather than a distinct error.
pub(crate) fn normalize_booking_id(input: &str) -> Result<BookingId, EngineError> {
    let normalized = input.trim().to_uppercase();
    if has_reserved(&normalized) {
        return Err(EngineError::Validation("invalid characters in booking id"));
    }
    if normalized.is_empty() {
        return Err(EngineError::BookingNotFound(normalized));
    }
    Ok(BookingId::new(normalized))
}

/// Blank names book as `Guest`.
pub(crate) fn normalize_user_name(input: &str) -> Result<String, EngineError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_USER_NAME.to_string());
    }
    if trimmed.len() > MAX_USER_NAME_LEN {
        return Err(EngineError::LimitExceeded("user name too long"));
    }
    Ok(trimmed.to_string())
}
