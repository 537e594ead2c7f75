//! Wall-clock helpers.
//!
//! All persisted timestamps are fractional epoch seconds from the OS clock.
//! They are advisory (staleness and retry scheduling only); correctness never
//! depends on clock discipline because every process on the host reads the
//! same clock.

use chrono::Utc;

/// Current time as fractional epoch seconds.
pub fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_now_is_monotonic_enough() {
        let a = epoch_now();
        let b = epoch_now();
        assert!(b >= a);
        assert!(a > 1_600_000_000.0, "clock looks sane");
    }
}
