/// Maximum number of slots a single store may hold.
pub const MAX_SLOTS: usize = 10_000;

/// Maximum length of a normalized slot identifier.
pub const MAX_SLOT_ID_LEN: usize = 32;

/// Maximum length of a caller-supplied user name.
pub const MAX_USER_NAME_LEN: usize = 128;

/// Length of a generated booking identifier.
pub const BOOKING_ID_LEN: usize = 8;
