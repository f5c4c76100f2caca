//! Simple interval timer driven by whatever clock the caller passes in.
//!
//! Time is never read inside the timer, which keeps the relay's periodic work
//! testable with made up timestamps.
pub struct MilliTimer {
    last_time: u128,
    interval: u128,
}

impl MilliTimer {
    pub fn build(now: u128, interval: u128) -> MilliTimer {
        MilliTimer {
            last_time: now,
            interval,
        }
    }
    pub fn set_interval(&mut self, interval: u128) -> () {
        self.interval = interval;
    }
    pub fn get_interval(&self) -> u128 {
        self.interval
    }
    /// true once at least `interval` has elapsed since the last reset
    pub fn expired(&self, now: u128) -> bool {
        self.last_time + self.interval <= now
    }
    pub fn reset(&mut self, now: u128) {
        self.last_time = now;
    }
    /// time left until expiry (zero if already expired)
    pub fn remaining(&self, now: u128) -> u128 {
        (self.last_time + self.interval).saturating_sub(now)
    }
    pub fn since(&self, now: u128) -> u128 {
        now.saturating_sub(self.last_time)
    }
}

#[cfg(test)]
mod test_timer {
    use super::*;

    #[test]
    fn expires_after_interval() {
        let now = 1_000;
        let mut mt = MilliTimer::build(now, 100);
        assert!(!mt.expired(now + 99));
        assert!(mt.expired(now + 100));
        mt.reset(now + 100);
        assert!(!mt.expired(now + 150));
        assert_eq!(mt.since(now + 150), 50);
        assert_eq!(mt.remaining(now + 150), 50);
    }

    #[test]
    fn remaining_never_underflows() {
        let mt = MilliTimer::build(10, 5);
        assert_eq!(mt.remaining(1_000), 0);
        assert_eq!(mt.since(0), 0);
    }

    #[test]
    fn interval_can_change() {
        let mut mt = MilliTimer::build(0, 5_000);
        mt.set_interval(10);
        assert_eq!(mt.get_interval(), 10);
        assert!(mt.expired(10));
    }
}
