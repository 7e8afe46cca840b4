//! Hard bounds enforced before any state is committed.

/// How far ahead of `today` a stay may begin or end, in days.
pub const BOOKING_HORIZON_DAYS: i64 = 30;

/// How many times `create_booking` re-scans for a free unit after losing
/// a commit race before giving up.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

pub const MAX_ROOM_TYPES: usize = 10_000;
pub const MAX_UNITS_PER_ROOM_TYPE: usize = 1_000;
pub const MAX_AMENITIES: usize = 64;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_GUEST_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 320;
