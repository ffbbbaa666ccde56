//! Session countdown timer
//!
//! Pure tick-driven struct; the controller's interval task feeds it
//! elapsed slices and the compound eligibility guard. Expiry is latched
//! so it fires exactly once.

use std::time::Duration;

/// Counts interview time against the allowed duration
#[derive(Debug)]
pub struct SessionTimer {
    allowed: Duration,
    elapsed: Duration,
    paused: bool,
    expired: bool,
}

impl SessionTimer {
    pub fn new(allowed: Duration) -> Self {
        Self {
            allowed,
            elapsed: Duration::ZERO,
            paused: false,
            expired: false,
        }
    }

    /// Advance by `dt` when eligible
    ///
    /// The timer only runs while the call is live, unpaused, and audio
    /// is healthy. Returns true exactly once, on the tick that crosses
    /// the allowed duration.
    pub fn tick(&mut self, dt: Duration, calling: bool, audio_healthy: bool) -> bool {
        if self.expired || self.paused || !calling || !audio_healthy {
            return false;
        }

        self.elapsed += dt;
        if self.elapsed >= self.allowed {
            self.expired = true;
            return true;
        }
        false
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Time left, floored at zero
    pub fn remaining(&self) -> Duration {
        self.allowed.saturating_sub(self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Duration = Duration::from_millis(100);

    #[test]
    fn test_counts_only_while_eligible() {
        let mut timer = SessionTimer::new(Duration::from_secs(10));

        assert!(!timer.tick(DT, false, true));
        assert_eq!(timer.elapsed(), Duration::ZERO);

        assert!(!timer.tick(DT, true, false));
        assert_eq!(timer.elapsed(), Duration::ZERO);

        assert!(!timer.tick(DT, true, true));
        assert_eq!(timer.elapsed(), DT);
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let mut timer = SessionTimer::new(Duration::from_secs(10));
        timer.tick(DT, true, true);
        timer.pause();
        timer.tick(DT, true, true);
        assert_eq!(timer.elapsed(), DT);

        timer.resume();
        timer.tick(DT, true, true);
        assert_eq!(timer.elapsed(), DT * 2);
    }

    #[test]
    fn test_expiry_fires_once() {
        let mut timer = SessionTimer::new(Duration::from_millis(250));

        assert!(!timer.tick(DT, true, true));
        assert!(!timer.tick(DT, true, true));
        assert!(timer.tick(DT, true, true));
        assert!(timer.is_expired());
        assert!(!timer.tick(DT, true, true));
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let mut timer = SessionTimer::new(Duration::from_millis(50));
        timer.tick(DT, true, true);
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_no_expiry_while_paused_or_impaired() {
        let mut timer = SessionTimer::new(Duration::from_millis(100));
        timer.pause();
        assert!(!timer.tick(DT, true, true));
        assert!(!timer.is_expired());

        timer.resume();
        assert!(!timer.tick(DT, true, false));
        assert!(!timer.is_expired());
    }
}
