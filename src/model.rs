use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::BOOKING_ID_LEN;

/// Unix milliseconds.
pub type Ms = i64;

/// Label recorded when a caller books without giving a name.
pub const DEFAULT_USER_NAME: &str = "Guest";

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Identifier of a bookable slot, e.g. `A1`. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque booking identifier: fixed-length uppercase Crockford base32.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Take the random tail of a fresh ULID. The leading characters encode
    /// the timestamp and would make ids issued in the same millisecond share
    /// a prefix, so only the entropy part is kept.
    pub fn generate() -> Self {
        let ulid = Ulid::new().to_string();
        Self(ulid[ulid.len() - BOOKING_ID_LEN..].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Active,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub available: bool,
    pub last_updated: Ms,
}

/// A booking row. Never deleted; the full set is the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRecord {
    pub booking_id: BookingId,
    pub slot_id: SlotId,
    pub user_name: String,
    pub booking_time: Ms,
    pub status: BookingStatus,
}

/// Flat event records. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SlotAdded {
        slot_id: SlotId,
        at: Ms,
    },
    SlotRemoved {
        slot_id: SlotId,
    },
    SlotStatusSet {
        slot_id: SlotId,
        available: bool,
        at: Ms,
    },
    BookingCreated {
        booking_id: BookingId,
        slot_id: SlotId,
        user_name: String,
        at: Ms,
    },
    BookingStatusSet {
        booking_id: BookingId,
        status: BookingStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub slot_id: SlotId,
    pub available: bool,
    pub last_updated: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
}

impl Occupancy {
    /// Occupied share in percent; 0 for an empty lot.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.occupied as f64 * 100.0 / self.total as f64
    }
}

/// Broadcast to subscribers of a slot after each state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub slot_id: SlotId,
    pub booking_id: Option<BookingId>,
    pub available: bool,
    pub at: Ms,
}
