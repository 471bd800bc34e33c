use crate::model::Ms;

pub const MAX_MANAGERS: usize = 100_000;
pub const MAX_SLOTS_PER_MANAGER: usize = 50_000;
pub const MAX_SKILL_ENTRIES: usize = 256;
pub const MAX_SKILL_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_BATCH_SIZE: usize = 1_000;
pub const MAX_QUERY_PRODUCTS: usize = 64;

/// A single slot may not last longer than a day.
pub const MAX_SLOT_DURATION_MS: Ms = 86_400_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
