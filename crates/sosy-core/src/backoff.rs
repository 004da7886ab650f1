//! # Backoff Policy
//!
//! One exponential retry policy used by every retry path in the engine.
//!
//! ## Delay Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                delay(n) = base_delay × multiplier^n                     │
//! │                                                                         │
//! │  Offline request replay (n = recorded failures, base 1000ms):          │
//! │    n=0 → 1s     n=1 → 2s     n=2 → 4s     n=3 → dropped               │
//! │                                                                         │
//! │  Realtime reconnect (n = attempt - 1, base 1000ms):                    │
//! │    #1 → 1s  #2 → 2s  #3 → 4s  #4 → 8s  #5 → 16s  #6 → give up        │
//! │                                                                         │
//! │  Sync action push (no delay, attempts only):                           │
//! │    retry_count < 5 → offered to the server                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    OFFLINE_QUEUE_MAX_RETRIES, OFFLINE_RETRY_DELAY_BASE_MS, REALTIME_MAX_RECONNECT_ATTEMPTS,
    REALTIME_RECONNECT_DELAY_MS, SYNC_QUEUE_MAX_RETRIES,
};

/// Exponential backoff parameters with an attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Attempts allowed before the work is abandoned.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor per attempt. Must be at least 2 for a strictly
    /// increasing schedule.
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// Creates a policy with an explicit cap, base and multiplier.
    pub const fn new(max_attempts: u32, base_delay_ms: u64, multiplier: u32) -> Self {
        BackoffPolicy {
            max_attempts,
            base_delay_ms,
            multiplier,
        }
    }

    /// Replay policy for deferred raw requests (3 attempts, 1s base).
    pub const fn offline_queue() -> Self {
        Self::new(OFFLINE_QUEUE_MAX_RETRIES, OFFLINE_RETRY_DELAY_BASE_MS, 2)
    }

    /// Push policy for sync actions (5 attempts, no delay between cycles).
    pub const fn sync_queue() -> Self {
        Self::new(SYNC_QUEUE_MAX_RETRIES, 0, 2)
    }

    /// Reconnect policy for the realtime socket (5 attempts, 1s base).
    pub const fn realtime() -> Self {
        Self::new(REALTIME_MAX_RECONNECT_ATTEMPTS, REALTIME_RECONNECT_DELAY_MS, 2)
    }

    /// Returns a copy with a different base delay.
    pub const fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Returns a copy with a different attempt cap.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after `failures` previous failures.
    ///
    /// Saturates instead of overflowing for absurd attempt counts.
    ///
    /// ```rust
    /// use sosy_core::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::realtime();
    /// assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
    /// ```
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(failures);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Returns true once `attempts` has reached the cap.
    #[inline]
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Every delay the policy will ever hand out, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|n| self.delay_for(n)).collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::offline_queue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_queue_delays() {
        let policy = BackoffPolicy::offline_queue();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_realtime_schedule_strictly_increasing() {
        let schedule = BackoffPolicy::realtime().schedule();
        assert_eq!(schedule.len(), 5);
        assert_eq!(schedule[0], Duration::from_millis(1000));
        assert_eq!(schedule[4], Duration::from_millis(16_000));
        assert!(schedule.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_exhaustion_boundaries() {
        let policy = BackoffPolicy::offline_queue();
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));

        let sync = BackoffPolicy::sync_queue();
        assert!(!sync.is_exhausted(4));
        assert!(sync.is_exhausted(5));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = BackoffPolicy::realtime();
        assert_eq!(policy.delay_for(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_builders() {
        let policy = BackoffPolicy::realtime()
            .with_base_delay_ms(10)
            .with_max_attempts(2);
        assert_eq!(policy.schedule(), vec![Duration::from_millis(10), Duration::from_millis(20)]);
    }
}
