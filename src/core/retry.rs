//! Bounded exponential backoff.
//!
//! Used by the transport layer for the initial relay connection and for
//! transparent reconnects after a dropped relay link.

use std::time::Duration;

use crate::core::constants::{RECONNECT_INITIAL_BACKOFF, RECONNECT_MAX_BACKOFF};

/// Exponential backoff schedule with a cap.
///
/// Each call to [`Backoff::next_delay`] returns the current delay and doubles
/// it, saturating at the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a schedule starting at `initial` and capped at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// The next delay to sleep before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Reset the schedule to its initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RECONNECT_INITIAL_BACKOFF, RECONNECT_MAX_BACKOFF)
    }
}

/// Retry an async operation up to `max_attempts` times with backoff between
/// attempts. Returns the first success or the last error.
#[cfg(feature = "transport")]
pub async fn retry<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = Backoff::default();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts.max(1) {
                    return Err(err);
                }
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }
    }
}
