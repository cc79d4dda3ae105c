//! Token-bucket rate governor.
//!
//! Tokens accrue continuously at the configured rate and are capped at
//! one second's worth, bounding bursts to the sliding-window contract.
//! `acquire` deducts the batch size immediately and sleeps off any debt,
//! so a batch larger than the bucket is released after a proportional
//! delay instead of never. The bucket starts empty.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::ShutdownState;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Global records-per-second limiter shared by all producers.
pub struct RateGovernor {
    rate: f64,
    state: Mutex<TokenState>,
}

struct TokenState {
    tokens: f64,
    last_refill: Instant,
}

impl RateGovernor {
    /// Create a governor for `rate` records per second (must be > 0;
    /// validated at configuration time).
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            state: Mutex::new(TokenState {
                tokens: 0.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consume `n` tokens, sleeping until the rate allows their release.
    ///
    /// Returns `false` when shutdown was triggered while waiting; the
    /// caller must refund its budget reservation and stop.
    pub fn acquire(&self, n: u64, shutdown: &ShutdownState) -> bool {
        let debt = {
            let mut state = self.state.lock().expect("governor lock poisoned");
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            // Cap stored credit at one second's worth of tokens.
            state.tokens = (state.tokens + elapsed * self.rate).min(self.rate);
            state.last_refill = now;
            state.tokens -= n as f64;
            if state.tokens >= 0.0 {
                None
            } else {
                Some(Duration::from_secs_f64(-state.tokens / self.rate))
            }
        };

        let Some(mut remaining) = debt else {
            return true;
        };

        while remaining > Duration::ZERO {
            if shutdown.triggered() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        !shutdown.triggered()
    }

    /// The configured rate in records per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::test_support::shutdown_state;

    #[test]
    fn test_empty_bucket_paces_first_tokens() {
        let shutdown = shutdown_state();
        let governor = RateGovernor::new(1000.0);

        let start = Instant::now();
        assert!(governor.acquire(100, &shutdown));
        let elapsed = start.elapsed();
        // 100 tokens at 1000/s: about 100ms, pessimistic upper bound.
        assert!(elapsed >= Duration::from_millis(80), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }

    #[test]
    fn test_sustained_rate_is_enforced() {
        let shutdown = shutdown_state();
        let governor = RateGovernor::new(2000.0);

        let start = Instant::now();
        for _ in 0..4 {
            assert!(governor.acquire(100, &shutdown));
        }
        // 400 tokens at 2000/s: about 200ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
    }

    #[test]
    fn test_batch_larger_than_bucket_is_released() {
        let shutdown = shutdown_state();
        let governor = RateGovernor::new(10_000.0);
        let start = Instant::now();
        // 3x the bucket capacity still completes, proportionally late.
        assert!(governor.acquire(30_000, &shutdown));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_shutdown_interrupts_wait() {
        let shutdown = shutdown_state();
        let governor = RateGovernor::new(1.0);
        shutdown.trigger();
        assert!(!governor.acquire(100, &shutdown));
    }
}
