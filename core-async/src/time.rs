//! Time utilities.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep};

/// Milliseconds since the UNIX epoch, saturating to zero for clocks set before it.
///
/// ```rust
/// use core_async::time::now_millis;
///
/// assert!(now_millis() > 0);
/// ```
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Seconds since the UNIX epoch.
pub fn now_secs() -> u64 {
    now_millis() / 1_000
}
