use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch, fractional. All cache expiry math uses
/// this single clock.
#[inline]
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
