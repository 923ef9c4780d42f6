//! Minimum-delay rate limiting for requests against the remote source.
//!
//! A single limiter is shared by every fetch in a run. [`RateLimiter::wait`]
//! hands out a [`Permit`] once `interval` has passed since the previous
//! permit was released; the caller holds it for the whole request, and
//! dropping it marks the end of that request. The pause is therefore
//! measured from one response to the next request, however slow the
//! server is, and only one permit exists at a time.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

pub struct RateLimiter {
    interval: Duration,
    released: Mutex<Option<Instant>>,
}

/// Exclusive right to talk to the remote source. Released on drop.
pub struct Permit<'a> {
    released: MutexGuard<'a, Option<Instant>>,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self.released = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            released: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Wait until `interval` has passed since the previous permit was
    /// dropped. The first call returns immediately.
    pub async fn wait(&self) -> Permit<'_> {
        let released = self.released.lock().await;
        if let Some(prev) = *released {
            if !self.interval.is_zero() {
                sleep_until(prev + self.interval).await;
            }
        }
        Permit { released }
    }
}
