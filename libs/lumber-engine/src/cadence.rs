use std::time::Duration;

use tokio::time::Instant;

/// Upper bound on the time trigger, whatever the file age limit.
pub const MAX_CHECK_INTERVAL_SECS: u64 = 600;

/// Count-or-time schedule for non-forced upload policy checks.
///
/// A check is due every `messages_per_second` ticks, or once
/// `min(600, max_file_age_seconds / 2)` seconds passed since the last one.
#[derive(Debug)]
pub struct Cadence {
    messages_per_check: u64,
    check_interval: Duration,
    iterations: u64,
    last_checked: Instant,
}

impl Cadence {
    /// `messages_per_second` must be non-zero; config validation guarantees it.
    pub fn new(max_file_age_seconds: u64, messages_per_second: u64) -> Self {
        Self {
            messages_per_check: messages_per_second.max(1),
            check_interval: check_interval(max_file_age_seconds),
            iterations: 0,
            last_checked: Instant::now(),
        }
    }

    /// Count one loop tick, whatever its outcome.
    pub fn record_tick(&mut self) {
        self.iterations += 1;
    }

    /// Whether a policy check is due now. Taking a check resets the time trigger.
    pub fn is_due(&mut self) -> bool {
        let now = Instant::now();
        let due = self.iterations % self.messages_per_check == 0
            || now.duration_since(self.last_checked) > self.check_interval;
        if due {
            self.last_checked = now;
        }
        due
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }
}

pub fn check_interval(max_file_age_seconds: u64) -> Duration {
    Duration::from_secs(MAX_CHECK_INTERVAL_SECS.min(max_file_age_seconds / 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_half_the_file_age_capped_at_ten_minutes() {
        assert_eq!(check_interval(1200), Duration::from_secs(600));
        assert_eq!(check_interval(3600), Duration::from_secs(600));
        assert_eq!(check_interval(300), Duration::from_secs(150));
        assert_eq!(check_interval(1), Duration::from_secs(0));
    }

    #[tokio::test(start_paused = true)]
    async fn count_trigger_fires_every_r_ticks() {
        let mut cadence = Cadence::new(1200, 500);
        let mut due_at = Vec::new();
        for _ in 0..1500 {
            cadence.record_tick();
            if cadence.is_due() {
                due_at.push(cadence.iterations());
            }
        }
        assert_eq!(due_at, vec![500, 1000, 1500]);
    }

    #[tokio::test(start_paused = true)]
    async fn time_trigger_fires_after_the_interval() {
        let mut cadence = Cadence::new(1200, 500);

        tokio::time::advance(Duration::from_secs(600)).await;
        cadence.record_tick();
        // Exactly the interval is not enough, it must be exceeded.
        assert!(!cadence.is_due());

        tokio::time::advance(Duration::from_millis(1)).await;
        cadence.record_tick();
        assert!(cadence.is_due());

        // The check reset the clock.
        cadence.record_tick();
        assert!(!cadence.is_due());
        tokio::time::advance(Duration::from_secs(601)).await;
        cadence.record_tick();
        assert!(cadence.is_due());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_partition_is_checked_on_time_alone() {
        // 3 ticks per 10 minutes is far below the count trigger.
        let mut cadence = Cadence::new(60, 10_000);
        let mut checks = 0;
        for _ in 0..30 {
            tokio::time::advance(Duration::from_secs(11)).await;
            cadence.record_tick();
            if cadence.is_due() {
                checks += 1;
            }
        }
        assert_eq!(cadence.check_interval(), Duration::from_secs(30));
        // 11s per tick: every third tick exceeds the 30s interval.
        assert_eq!(checks, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn count_check_resets_the_time_trigger() {
        let mut cadence = Cadence::new(1200, 2);
        tokio::time::advance(Duration::from_secs(599)).await;
        cadence.record_tick();
        assert!(!cadence.is_due());
        cadence.record_tick();
        assert!(cadence.is_due());

        tokio::time::advance(Duration::from_secs(2)).await;
        cadence.record_tick();
        assert!(!cadence.is_due());
    }
}
