use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source shared by acquisition and actuator workers.
///
/// Workers never read `Instant::now()` directly so tests can drive settle
/// timeouts and stall detection without sleeping.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }

    /// True once `deadline` is reached.
    fn is_past(&self, deadline: Instant) -> bool {
        self.now() >= deadline
    }
}

/// Wall-clock implementation backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Manually advanced clock for deterministic tests.
///
/// `sleep(d)` advances time by `d` without blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: std::sync::Arc<std::sync::Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
        self.origin + off
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let c = ManualClock::new();
        let t0 = c.now();
        c.sleep(Duration::from_millis(250));
        assert_eq!(c.ms_since(t0), 250);
        assert!(c.is_past(t0 + Duration::from_millis(250)));
        assert!(!c.is_past(t0 + Duration::from_millis(251)));
    }

    #[test]
    fn ms_since_saturates_for_future_epoch() {
        let c = ManualClock::new();
        let future = c.now() + Duration::from_secs(1);
        assert_eq!(c.ms_since(future), 0);
    }
}
