//! Application constants

/// Platform limit for media attachments on a single published post
pub const MAX_MEDIA_PER_POST: usize = 4;

/// Maximum due posts claimed per dispatch run
pub const CLAIM_BATCH_SIZE: i64 = 64;

/// Default lease on a claimed post before another run may re-claim it (seconds)
pub const DEFAULT_LEASE_SECONDS: i64 = 300;

/// Default timeout for outbound HTTP calls (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Default internal cron cadence when DISPATCH_CRON is enabled (seconds)
pub const DEFAULT_CRON_SECONDS: u64 = 30;
