//! Procedural wind for the cloud detail noise.
//!
//! The detail layer drifts along a slowly rotating direction. The offset is a
//! pure function of elapsed time; the animator keeps no accumulator, so
//! scrubbing the clock backwards or rendering frames out of order gives the
//! same result.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::Clock;

/// Decorrelates the Y phase from X/Z so the three axes never move in lockstep.
pub const WIND_AXIS_DECORRELATION: f32 = 0.3421;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindAnimator {
    /// Offset magnitude in world units.
    pub details_wind_speed: f32,
    /// Angular rate of the drift direction, radians per second.
    pub details_wind_change_speed: f32,
}

impl Default for WindAnimator {
    fn default() -> Self {
        Self {
            details_wind_speed: 200.0,
            details_wind_change_speed: 0.05,
        }
    }
}

impl WindAnimator {
    pub fn new(details_wind_speed: f32, details_wind_change_speed: f32) -> Self {
        Self {
            details_wind_speed,
            details_wind_change_speed,
        }
    }

    /// Detail offset at `t` seconds.
    pub fn offset_at(&self, t: f32) -> Vec3 {
        let phase = t * self.details_wind_change_speed;
        Vec3::new(
            phase.cos(),
            (phase * WIND_AXIS_DECORRELATION).sin(),
            phase.sin(),
        ) * self.details_wind_speed
    }

    /// Detail offset at the clock's current elapsed time.
    pub fn update(&self, clock: &Clock) -> Vec3 {
        self.offset_at(clock.elapsed_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_at_zero() {
        let wind = WindAnimator::default();
        assert_eq!(wind.offset_at(0.0), Vec3::new(200.0, 0.0, 0.0));
    }

    #[test]
    fn test_deterministic() {
        let a = WindAnimator::new(350.0, 0.3);
        let b = WindAnimator::new(350.0, 0.3);
        for t in [0.0, 0.016, 1.5, 123.456, 9999.0] {
            let (oa, ob) = (a.offset_at(t), b.offset_at(t));
            assert_eq!(oa.x.to_bits(), ob.x.to_bits());
            assert_eq!(oa.y.to_bits(), ob.y.to_bits());
            assert_eq!(oa.z.to_bits(), ob.z.to_bits());
        }
    }

    #[test]
    fn test_axes_decorrelated() {
        let wind = WindAnimator::new(1.0, 1.0);
        let t = 2.0;
        let o = wind.offset_at(t);
        assert!((o.x - t.cos()).abs() < 1e-6);
        assert!((o.y - (t * 0.3421).sin()).abs() < 1e-6);
        assert!((o.z - t.sin()).abs() < 1e-6);
    }

    #[test]
    fn test_update_reads_clock() {
        let wind = WindAnimator::new(10.0, 0.5);
        let mut clock = Clock::fixed_step(1.0 / 60.0);
        for _ in 0..120 {
            clock.tick();
        }
        let expected = wind.offset_at(clock.elapsed_seconds());
        assert_eq!(wind.update(&clock), expected);
    }
}
