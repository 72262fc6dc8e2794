/// Viewport applied to desktop campaigns.
pub const DESKTOP_SCREEN_SIZE: (u32, u32) = (1366, 768);

/// Viewport applied to mobile campaigns.
pub const MOBILE_SCREEN_SIZE: (u32, u32) = (640, 1136);

/// Fixed delay before retrying tab acquisition once the farm signals it has no capacity. A render
/// cycle on the farm takes on the order of ten seconds, so there is no point hammering it.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// How many times a job's command sequence may fail before the job is surfaced as permanently
/// failed.
pub const DEFAULT_RETRY_CEILING: u32 = 2;
