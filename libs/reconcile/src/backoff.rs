//! Per-key requeue backoff for transient failures.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Exponential backoff tracker, keyed by the reconciled object.
///
/// The n-th consecutive failure of a key waits `base * 2^(n-1)`, capped at
/// `max`. A successful pass clears the key.
#[derive(Debug, Clone)]
pub struct RequeueBackoff {
    base: Duration,
    max: Duration,

    /// key -> (consecutive failures, last failure time).
    failures: BTreeMap<String, (u32, Instant)>,
}

impl RequeueBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: BTreeMap::new(),
        }
    }

    /// Records a failure and returns how long to wait before the next pass.
    pub fn record_failure(&mut self, key: &str) -> Duration {
        let now = Instant::now();
        let entry = self.failures.entry(key.to_string()).or_insert((0, now));
        entry.0 = entry.0.saturating_add(1);
        entry.1 = now;
        let count = entry.0;
        self.delay_for(count)
    }

    /// Consecutive failures recorded for `key`.
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map_or(0, |(count, _)| *count)
    }

    /// Clears failure tracking for a key (on success).
    pub fn clear(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// Drops keys that have not failed for longer than the cap.
    pub fn prune(&mut self) {
        let now = Instant::now();
        let horizon = self.max;
        self.failures
            .retain(|_, (_, last)| now.duration_since(*last) <= horizon);
    }

    fn delay_for(&self, count: u32) -> Duration {
        let exponent = count.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = RequeueBackoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.record_failure("fleet/default/a"), Duration::from_secs(1));
        assert_eq!(backoff.record_failure("fleet/default/a"), Duration::from_secs(2));
        assert_eq!(backoff.record_failure("fleet/default/a"), Duration::from_secs(4));
        assert_eq!(backoff.record_failure("fleet/default/a"), Duration::from_secs(5));
        assert_eq!(backoff.failures("fleet/default/a"), 4);

        // Keys are independent.
        assert_eq!(backoff.record_failure("fleet/default/b"), Duration::from_secs(1));
    }

    #[test]
    fn test_clear_resets() {
        let mut backoff = RequeueBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.record_failure("k");
        backoff.record_failure("k");
        backoff.clear("k");
        assert_eq!(backoff.failures("k"), 0);
        assert_eq!(backoff.record_failure("k"), Duration::from_millis(100));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = RequeueBackoff::new(Duration::from_secs(1), Duration::from_secs(300));
        let mut last = Duration::ZERO;
        for _ in 0..100 {
            last = backoff.record_failure("k");
        }
        assert_eq!(last, Duration::from_secs(300));

        backoff.prune();
        assert_eq!(backoff.failures("k"), 100);
    }
}
