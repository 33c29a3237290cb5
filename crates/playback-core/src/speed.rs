//! Playback speed and the real-time/snapshot-time conversions it implies.

/// Slowest accepted speed, in percent.
pub const MIN_SPEED_PERCENT: f64 = 0.01;

/// Fastest accepted speed, in percent.
pub const MAX_SPEED_PERCENT: f64 = 400.0;

/// Units per percent in the fixed-point representation.
const SCALE: i128 = 1000;

/// 100% in fixed point.
const NORMAL: i128 = 100 * SCALE;

/// Playback speed as a clamped percentage.
///
/// Stored in thousandths of a percent so all time conversions are integer
/// arithmetic on `i128`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Speed(u32);

impl Speed {
    pub const NORMAL: Speed = Speed(NORMAL as u32);
    pub const HALF: Speed = Speed((NORMAL / 2) as u32);

    /// Build from a percentage, clamped to `[0.01, 400]`. NaN means 100%.
    pub fn from_percent(percent: f64) -> Self {
        if percent.is_nan() {
            return Self::NORMAL;
        }
        let clamped = percent.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT);
        Speed((clamped * SCALE as f64).round() as u32)
    }

    pub fn percent(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// One and a half times as fast.
    pub fn faster(self) -> Self {
        Self::from_fixed(self.0 as i128 * 3 / 2)
    }

    /// Two thirds as fast.
    pub fn slower(self) -> Self {
        Self::from_fixed(self.0 as i128 * 2 / 3)
    }

    /// Snapshot time covered in `real_ns` of wall-clock time.
    pub fn to_snapshot(self, real_ns: i128) -> i128 {
        real_ns * self.0 as i128 / NORMAL
    }

    /// Wall-clock time needed to cover `snapshot_ns` of snapshot time.
    pub fn to_real(self, snapshot_ns: i128) -> i128 {
        snapshot_ns * NORMAL / self.0 as i128
    }

    /// Audio sample rate that plays `rate` samples at this speed.
    pub fn scale_rate(self, rate: u32) -> u32 {
        (rate as i128 * self.0 as i128 / NORMAL).max(1) as u32
    }

    fn from_fixed(value: i128) -> Self {
        let min = (MIN_SPEED_PERCENT * SCALE as f64) as i128;
        let max = (MAX_SPEED_PERCENT * SCALE as f64) as i128;
        Speed(value.clamp(min, max) as u32)
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(Speed::from_percent(1000.0).percent(), 400.0);
        assert_eq!(Speed::from_percent(0.0).percent(), 0.01);
        assert_eq!(Speed::from_percent(f64::NAN), Speed::NORMAL);
        assert_eq!(Speed::from_percent(400.0).faster().percent(), 400.0);
    }

    #[test]
    fn test_double_speed_halves_real_time() {
        let speed = Speed::from_percent(200.0);
        assert_eq!(speed.to_real(10_000_000_000), 5_000_000_000);
        assert_eq!(speed.to_snapshot(5_000_000_000), 10_000_000_000);
        assert_eq!(speed.scale_rate(48_000), 96_000);
    }

    #[test]
    fn test_faster_and_slower() {
        assert_eq!(Speed::NORMAL.faster().percent(), 150.0);
        assert_eq!(Speed::from_percent(150.0).slower(), Speed::NORMAL);
        assert_eq!(Speed::HALF.percent(), 50.0);
    }

    #[test]
    fn test_round_trip_never_overshoots() {
        let speed = Speed::from_percent(33.3);
        for real in [1i128, 7, 1_000_003, 16_666_667] {
            assert!(speed.to_real(speed.to_snapshot(real)) <= real);
        }
    }
}
