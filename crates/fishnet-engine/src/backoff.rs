//! Backoff delay generator used between HTTP retries, between `acquire` polls when no
//! job is available, and after a transport failure.

use std::time::Duration;

const MAX_FIXED_BACKOFF: f64 = 3.0;
const MAX_EXPANDING_BACKOFF: f64 = 30.0;

/// `fixed` draws a uniform random delay in `[0, 3.0)` seconds every time, suited to move
/// servers where requests should stay snappy. The default, expanding mode starts at
/// `0.5 + 0.5*U(0,1)` seconds and grows by one step each call, capped at 30 seconds.
pub struct Backoff {
    fixed: bool,
    step: f64,
}

impl Backoff {
    pub fn new(fixed: bool) -> Self {
        Self { fixed, step: 1.0 }
    }

    pub fn next(&mut self) -> Duration {
        let seconds = if self.fixed {
            fastrand::f64() * MAX_FIXED_BACKOFF
        } else {
            let b = self.step;
            let delay = 0.5 * b + 0.5 * b * fastrand::f64();
            self.step = (b + 1.0).min(MAX_EXPANDING_BACKOFF);
            delay
        };
        Duration::from_secs_f64(seconds)
    }

    /// Reset the expanding step back to its starting point. Called after a successful
    /// request, so a transient run of failures doesn't leave the client backed off for
    /// longer than the outage that caused it.
    pub fn reset(&mut self) {
        self.step = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_stays_within_the_cap() {
        let mut backoff = Backoff::new(true);
        for _ in 0..50 {
            let delay = backoff.next();
            assert!(delay.as_secs_f64() < MAX_FIXED_BACKOFF);
        }
    }

    #[test]
    fn expanding_backoff_grows_then_caps() {
        let mut backoff = Backoff::new(false);
        let first = backoff.next();
        assert!(first.as_secs_f64() < 1.0);
        for _ in 0..100 {
            backoff.next();
        }
        let late = backoff.next();
        assert!(late.as_secs_f64() <= MAX_EXPANDING_BACKOFF);
    }

    #[test]
    fn reset_returns_to_the_starting_step() {
        let mut backoff = Backoff::new(false);
        for _ in 0..10 {
            backoff.next();
        }
        backoff.reset();
        let delay = backoff.next();
        assert!(delay.as_secs_f64() < 1.0);
    }
}
