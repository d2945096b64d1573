//! Process-wide token bucket gating calls to the embedding service.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

use super::cancel::CancelToken;
use crate::error::RateLimitError;

/// Token bucket with capacity 1 and a fixed refill interval.
///
/// One instance is shared by reference across all workers. Callers reserve
/// the next free slot under a short lock and then sleep outside it, so
/// grants are handed out in reservation order (FIFO) and no caller starves.
/// Time comes from `tokio::time`, which tests drive with a paused clock.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// One token every `interval`, burst of one.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// A budget of `requests` calls per minute (one token every 60/N seconds).
    pub fn per_minute(requests: u32) -> Self {
        Self::new(Duration::from_secs(60) / requests.max(1))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a token is available.
    ///
    /// Returns `RateLimitError::Cancelled` if `cancel` fires first; the
    /// reserved slot is handed back when nobody has queued behind it.
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let slot = self.reserve();

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.release(slot);
                Err(RateLimitError::Cancelled)
            }
            () = sleep_until(slot) => Ok(()),
        }
    }

    fn reserve(&self) -> Instant {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }

    fn release(&self, slot: Instant) {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        if *next == Some(slot + self.interval) {
            *next = Some(slot);
        }
    }
}
