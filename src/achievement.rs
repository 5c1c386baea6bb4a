//! Milestone celebration shown when the highest value reaches a target.

use std::time::{Duration, Instant};

/// A one-shot celebration timer. Never affects game state.
#[derive(Clone, Debug)]
pub struct Achievement {
    target: u32,
    duration: Duration,
    visible_until: Option<Instant>,
}

impl Achievement {
    pub fn new(target: u32, duration: Duration) -> Self {
        Self { target, duration, visible_until: None }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Check a freshly updated highest value. Returns true if the celebration
    /// started.
    pub fn check(&mut self, highest_value: u32, now: Instant) -> bool {
        if highest_value != self.target {
            return false;
        }
        self.visible_until = Some(now + self.duration);
        true
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        self.visible_until.is_some_and(|until| now < until)
    }

    pub fn dismiss(&mut self) {
        self.visible_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exact_target_triggers() {
        let now = Instant::now();
        let mut a = Achievement::new(64, Duration::from_secs(5));
        assert!(!a.check(32, now));
        assert!(!a.check(128, now));
        assert!(!a.is_visible(now));
        assert!(a.check(64, now));
        assert!(a.is_visible(now));
    }

    #[test]
    fn test_auto_dismiss() {
        let now = Instant::now();
        let mut a = Achievement::new(64, Duration::from_secs(5));
        a.check(64, now);
        assert!(a.is_visible(now + Duration::from_millis(4_999)));
        assert!(!a.is_visible(now + Duration::from_secs(5)));
    }
}
