//! spec.rs — Robot physical parameters
//!
//! Fully-populated immutable parameter records. Nothing reads these from a
//! hidden global: `DEFAULT` is a plain constant and every modeller takes its
//! spec as an explicit argument.

use serde::{Deserialize, Serialize};

/// Meters of linear travel per wheel encoder pulse.
pub const DISTANCE_PER_PULSE: f64 = 0.0049;

/// Maximum wheel speed, pulses per second.
pub const MAX_PPS: f64 = 60.0;

/// Speed of sound, m/s (ultrasonic echo model).
pub const SPEED_OF_SOUND: f64 = 340.0;

/// Meters of target distance per microsecond of echo round-trip delay.
pub const DISTANCE_SCALE: f64 = SPEED_OF_SOUND / 2.0 * 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotSpec {
    /// Maximum sensed range, meters. Signals report 0 (no echo) beyond it.
    pub max_radar_distance: f64,
    /// Half-width of the sensor cone, degrees.
    pub receptive_angle_deg: f64,
    /// Robot body radius for contact geometry, meters.
    pub contact_radius: f64,
    /// Physical size of a fiducial marker, meters.
    pub marker_size: f64,
}

impl RobotSpec {
    pub const DEFAULT: RobotSpec = RobotSpec {
        max_radar_distance: 3.0,
        receptive_angle_deg: 15.0,
        contact_radius: 0.28,
        marker_size: 0.3,
    };

    /// Sensor cone half-width in radians.
    pub fn receptive_angle(&self) -> f64 {
        self.receptive_angle_deg.to_radians()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_delay_maps_to_meters() {
        // 1 m target: 2 m round trip at 340 m/s ≈ 5882 µs
        let delay_us = 2.0 / SPEED_OF_SOUND * 1e6;
        assert!((delay_us * DISTANCE_SCALE - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_spec_is_usable() {
        let spec = RobotSpec::DEFAULT;
        assert!(spec.max_radar_distance > 0.0);
        assert!((spec.receptive_angle() - 15f64.to_radians()).abs() < 1e-12);
    }
}
