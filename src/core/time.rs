//! Epoch-millisecond clock helpers.
//!
//! All protocol deadlines (`expiresAt`, OTP deadlines, envelope timestamps)
//! are absolute epoch milliseconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Absolute deadline `ttl` from now, in epoch milliseconds.
pub fn deadline_ms(ttl: Duration) -> u64 {
    now_ms().saturating_add(ttl.as_millis() as u64)
}

/// Time remaining until an epoch-millisecond deadline, zero if passed.
pub fn until_ms(deadline: u64) -> Duration {
    Duration::from_millis(deadline.saturating_sub(now_ms()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_in_the_future() {
        let d = deadline_ms(Duration::from_secs(60));
        assert!(d > now_ms());
    }

    #[test]
    fn test_until_passed_deadline_is_zero() {
        assert_eq!(until_ms(now_ms().saturating_sub(10_000)), Duration::ZERO);
    }
}
