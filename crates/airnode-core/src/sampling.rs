//! Periodic sample scheduling
//!
//! The scheduler is a plain function of `(now, next deadline, interval)`: the
//! main loop polls it once per iteration and it reports whether the sampling
//! step is due. It fires at most once per poll and never catches up on missed
//! intervals; after each firing the next deadline is `now + interval`.

/// Shortest interval accepted; a zero interval would fire on every poll.
pub const MIN_INTERVAL_MS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleScheduler {
    interval_ms: u64,
    next_fire_ms: u64,
}

impl SampleScheduler {
    /// Register a recurring sample. The first firing is one full interval
    /// after `registered_at_ms`.
    pub const fn every(interval_ms: u64, registered_at_ms: u64) -> Self {
        let interval_ms = if interval_ms < MIN_INTERVAL_MS {
            MIN_INTERVAL_MS
        } else {
            interval_ms
        };

        Self {
            interval_ms,
            next_fire_ms: registered_at_ms.saturating_add(interval_ms),
        }
    }

    /// Returns `true` when the sample is due, and moves the deadline one
    /// interval past `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_fire_ms {
            return false;
        }

        self.next_fire_ms = now_ms.saturating_add(self.interval_ms);
        true
    }

    pub const fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub const fn next_fire_ms(&self) -> u64 {
        self.next_fire_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fire_after_full_interval() {
        let mut scheduler = SampleScheduler::every(1000, 0);
        assert!(!scheduler.poll(0));
        assert!(!scheduler.poll(999));
        assert!(scheduler.poll(1000));
        assert_eq!(scheduler.next_fire_ms(), 2000);
    }

    #[test]
    fn test_registration_time_offsets_first_fire() {
        let mut scheduler = SampleScheduler::every(500, 10_000);
        assert!(!scheduler.poll(10_499));
        assert!(scheduler.poll(10_500));
    }

    #[test]
    fn test_no_catch_up_after_long_gap() {
        let mut scheduler = SampleScheduler::every(1000, 0);
        // Loop stalled for five intervals: one firing, not five.
        assert!(scheduler.poll(5_300));
        assert!(!scheduler.poll(5_301));
        assert!(!scheduler.poll(6_299));
        assert!(scheduler.poll(6_300));
    }

    #[test]
    fn test_at_most_once_per_interval_for_irregular_ticks() {
        let interval = 250;
        let mut scheduler = SampleScheduler::every(interval, 0);
        let mut last_fire = 0u64;
        let mut now = 0u64;
        let mut fires = 0;

        // Pseudo-random tick spacing between 1 and 97 ms.
        let mut seed = 7u64;
        for _ in 0..5_000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            now += 1 + (seed >> 33) % 97;

            if scheduler.poll(now) {
                assert!(now - last_fire >= interval, "fired early at {now}");
                last_fire = now;
                fires += 1;
            }
        }

        assert!(fires > 0);
        assert!(fires as u64 <= now / interval);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let mut scheduler = SampleScheduler::every(0, 0);
        assert_eq!(scheduler.interval_ms(), MIN_INTERVAL_MS);
        assert!(!scheduler.poll(0));
        assert!(scheduler.poll(1));
        assert!(!scheduler.poll(1));
    }
}
