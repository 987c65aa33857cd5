use std::cell::Cell;
use std::time::Instant;

/// Fractional seconds on a monotonic timeline. Every timestamp in the
/// pipeline (filter steps, eviction, ack liveness) comes from here.
pub trait Clock {
    fn now(&self) -> f64;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> MonotonicClock {
        MonotonicClock::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-cranked clock for tests.
#[derive(Default)]
pub struct ManualClock(Cell<f64>);

impl ManualClock {
    pub fn set(&self, ts: f64) {
        self.0.set(ts);
    }

    pub fn advance(&self, secs: f64) {
        self.0.set(self.0.get() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.0.get()
    }
}

#[cfg(test)]
mod test {
    use super::{Clock, ManualClock, MonotonicClock};

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }

    #[test]
    fn manual_clock_is_settable() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), 0.0);
        clock.set(10.5);
        assert_eq!(clock.now(), 10.5);
        clock.advance(0.5);
        assert_eq!(clock.now(), 11.0);
    }
}
