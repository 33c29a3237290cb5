//! Clock and timing utilities for stream synchronization.
//!
//! Every timestamp in Rewind is a nanosecond count in the host's monotonic
//! time domain. This module provides:
//! - The [`Clock`] collaborator interface (`now_ns`)
//! - A monotonic implementation anchored at an `Instant` epoch
//! - A manually driven implementation for tests and simulations
//! - Drift measurement between a stream timestamp and the clock

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NSEC_PER_MSEC: u64 = 1_000_000;

/// Source of "now" in the host's time domain.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds.
    fn now_ns(&self) -> u64;
}

/// Host clock: nanoseconds since the engine started, offset by one second.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        // Producers use 0 for "no timestamp".
        self.epoch.elapsed().as_nanos() as u64 + NSEC_PER_SEC
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock reading `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    /// Move forward by `delta_ns` and return the new time.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst) + delta_ns
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// A producer timestamp compared against the clock.
///
/// Both thresholds are strict: a gap exactly at the tolerance is neither
/// in sync nor drifting.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    pub reference_ns: u64,
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Signed gap, positive when the stream runs ahead of the clock.
    pub fn drift_ns(&self) -> i64 {
        (self.measured_ns as i128 - self.reference_ns as i128)
            .clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / NSEC_PER_MSEC as f64
    }

    pub fn exceeds_ns(&self, tolerance_ns: u64) -> bool {
        self.reference_ns.abs_diff(self.measured_ns) > tolerance_ns
    }

    pub fn within_ns(&self, tolerance_ns: u64) -> bool {
        self.reference_ns.abs_diff(self.measured_ns) < tolerance_ns
    }
}

/// Fixed-cadence gate for polling loops (producers, playback ticks).
///
/// Ticks stay on the grid laid down by the first tick, so a late poll does
/// not push every later tick back.
#[derive(Debug)]
pub struct RateController {
    interval_ns: u64,
    next_ns: Option<u64>,
}

impl RateController {
    pub fn new(hz: u32) -> Self {
        Self {
            interval_ns: NSEC_PER_SEC / hz.max(1) as u64,
            next_ns: None,
        }
    }

    /// Whether a tick is due at `now_ns`. The first call always is.
    pub fn should_tick(&mut self, now_ns: u64) -> bool {
        let due = self.next_ns.unwrap_or(now_ns);
        if now_ns < due {
            return false;
        }
        self.next_ns = Some(due + self.interval_ns);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_reports_zero() {
        let clock = MonotonicClock::start();
        let first = clock.now_ns();
        assert!(first >= NSEC_PER_SEC);
        assert!(clock.now_ns() >= first);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.advance(5), 15);
        assert_eq!(clock.now_ns(), 15);
        clock.set(100);
        assert_eq!(clock.now_ns(), 100);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_ns(10_000_000));
        assert!(!drift.exceeds_ns(100_000_000));
        assert!(drift.within_ns(100_000_000));
    }

    #[test]
    fn test_drift_measurement_behind_reference() {
        let drift = DriftMeasurement {
            reference_ns: 5_000_000_000,
            measured_ns: 1_000_000_000,
        };
        assert_eq!(drift.drift_ns(), -4_000_000_000);
        assert!(drift.exceeds_ns(2_000_000_000));
        assert!(!drift.within_ns(4_000_000_000));
    }

    #[test]
    fn test_rate_controller_keeps_its_grid() {
        let mut rate = RateController::new(50);
        assert!(rate.should_tick(1_000));
        assert!(!rate.should_tick(15_000_000));
        // A late poll does not shift the grid.
        assert!(rate.should_tick(26_000_000));
        assert!(!rate.should_tick(40_000_000));
        assert!(rate.should_tick(41_000_000));
    }
}
