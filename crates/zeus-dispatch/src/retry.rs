//! Retry policy: bounded exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// `delay(k) = min(base * 2^k, cap)`, then +/-20% uniform jitter.
///
/// Attempts are unbounded (the dispatcher never drops a queued envelope on
/// its own), so the policy only shapes the retry cadence.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempts: u32) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(attempts.min(20) as i32);
        let bounded = exp.min(self.cap.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_secs_f64(bounded * jitter)
    }
}
