//! Hard bounds enforced at the edges of every mutation. A rejected request
//! is an error, never a silent truncation.

use crate::model::Day;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_PURPOSE_LEN: usize = 1024;
pub const MAX_NOTES_LEN: usize = 1024;

pub const MAX_USERS_PER_TENANT: usize = 100_000;
pub const MAX_FACILITIES_PER_TENANT: usize = 10_000;
pub const MAX_EQUIPMENT_PER_TENANT: usize = 10_000;

/// Requests retained per facility/equipment, all statuses included.
pub const MAX_REQUESTS_PER_RESOURCE: usize = 100_000;

/// Notifications retained per user feed before the oldest are dropped.
pub const MAX_FEED_LEN: usize = 1_000;

/// Largest borrowable quantity in a single request.
pub const MAX_QUANTITY: u32 = 10_000;

/// Longest borrowing window, in days (inclusive range).
pub const MAX_RANGE_DAYS: i64 = 365;

/// Calendar sanity window: 1970-01-01 .. ~2200.
pub const MIN_VALID_DAY: Day = 0;
pub const MAX_VALID_DAY: Day = 84_000;

pub const MINUTES_PER_DAY: i32 = 1_440;

pub const MAX_TENANTS: usize = 1_024;
pub const MAX_TENANT_NAME_LEN: usize = 256;
