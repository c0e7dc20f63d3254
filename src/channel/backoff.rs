use std::time::Duration;

use rand::Rng;

/// Exponential backoff with full jitter and a delay ceiling. Attempts are
/// unlimited; the ceiling bounds how hard a dead server gets hammered.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Upper bound for the given attempt: `base * 2^(attempt-1)`, capped.
    /// Attempt numbering starts at 1.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let raw = self.base.saturating_mul(1u32 << exp);
        raw.min(self.max)
    }

    /// Equal-jitter delay: half the ceiling fixed, half randomized, so the
    /// redial never fires sooner than `ceiling/2`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let half = ceiling.as_millis() as u64 / 2;
        let millis = half + rand::thread_rng().gen_range(0..=half.max(1));
        Duration::from_millis(millis)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Backoff;
    use std::time::Duration;

    #[test]
    fn ceiling_doubles_per_attempt() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));

        assert_eq!(backoff.ceiling(1), Duration::from_millis(500));
        assert_eq!(backoff.ceiling(2), Duration::from_millis(1000));
        assert_eq!(backoff.ceiling(3), Duration::from_millis(2000));
    }

    #[test]
    fn ceiling_is_capped_at_max() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));

        assert_eq!(backoff.ceiling(10), Duration::from_secs(30));
        assert_eq!(backoff.ceiling(1000), Duration::from_secs(30));
    }

    #[test]
    fn delay_stays_within_the_jitter_band() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));

        for attempt in 1..=12 {
            let ceiling = backoff.ceiling(attempt);
            let floor = ceiling / 2;
            for _ in 0..50 {
                let delay = backoff.delay(attempt);
                assert!(delay >= floor, "delay {delay:?} below floor {floor:?}");
                assert!(
                    delay <= ceiling + Duration::from_millis(1),
                    "delay {delay:?} above ceiling {ceiling:?}"
                );
            }
        }
    }
}
