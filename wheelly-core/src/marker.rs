//! marker.rs — Labeled fiducial marker fusion
//!
//! The range sensor says "something is here" (echo) or "nothing out to max
//! range" (no echo); the camera says "its label is X". A correlated pair of
//! the two confirms a marker, refines its location by exponential smoothing,
//! and evicts stale markers the sensor looked straight at without finding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use wheelly_types::{CameraMessage, Complex, Point, ProxyMessage, RobotSpec};

/// A labeled fiducial in the world model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMarker {
    pub label: String,
    pub location: Point,
    pub weight: f64,
    /// Time of the last confirming observation, ms.
    pub marker_time: u64,
    /// Time of the last clean check that saw the marker, ms.
    pub clean_time: u64,
}

/// A camera detection paired with the range sample considered its correlate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedCameraEvent {
    pub camera: CameraMessage,
    pub proxy: ProxyMessage,
}

impl CorrelatedCameraEvent {
    /// Time gap between the two halves, ms.
    pub fn correlation_gap(&self) -> u64 {
        self.camera.camera_time.abs_diff(self.proxy.simulation_time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Maximum camera/proxy time gap for fusion, ms.
    pub correlation_interval_ms: u64,
    /// Location smoothing time constant, ms.
    pub location_decay_ms: f64,
    /// Weight decay time constant for unconfirmed in-view markers, ms.
    pub weight_decay_ms: f64,
    /// Markers decayed below this weight are dropped.
    pub min_weight: f64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            correlation_interval_ms: 500,
            location_decay_ms: 30_000.0,
            weight_decay_ms: 60_000.0,
            min_weight: 0.1,
        }
    }
}

pub struct MarkerLocator {
    config: MarkerConfig,
}

impl MarkerLocator {
    pub fn new(config: MarkerConfig) -> Self {
        Self { config }
    }

    /// Fuse one correlated event into the marker map. Uncorrelated events
    /// return the map unchanged.
    pub fn update(
        &self,
        markers: &HashMap<String, LabelMarker>,
        event: &CorrelatedCameraEvent,
        spec: &RobotSpec,
    ) -> HashMap<String, LabelMarker> {
        if event.correlation_gap() > self.config.correlation_interval_ms {
            return markers.clone();
        }

        let proxy = &event.proxy;
        let t = proxy.simulation_time;
        let echo_distance = proxy.echo_distance();
        let sensor_location = proxy.location();
        let sensor_direction = proxy.sensor_direction();
        let mut out = markers.clone();

        // confirm or insert the sighted label
        let confirmed = if !event.camera.is_unknown() && echo_distance > 0.0 {
            let label = event.camera.label.clone();
            let observed =
                sensor_direction.at(sensor_location, echo_distance + spec.marker_size / 2.0);
            let marker = match out.get(&label) {
                None => {
                    debug!("marker {label}: created at ({:.2}, {:.2})", observed.x, observed.y);
                    LabelMarker {
                        label: label.clone(),
                        location: observed,
                        weight: 1.0,
                        marker_time: t,
                        clean_time: t,
                    }
                }
                Some(old) => {
                    let dt = t.saturating_sub(old.marker_time) as f64;
                    let gamma = (-dt / self.config.location_decay_ms).exp();
                    LabelMarker {
                        label: label.clone(),
                        location: old
                            .location
                            .scale(gamma)
                            .add(observed.scale(1.0 - gamma)),
                        weight: 1.0,
                        marker_time: t,
                        clean_time: t,
                    }
                }
            };
            out.insert(label.clone(), marker);
            Some(label)
        } else {
            None
        };

        // clean the rest against the sensed region
        let range = if echo_distance > 0.0 {
            echo_distance
        } else {
            spec.max_radar_distance
        };
        let fov = spec.receptive_angle();
        out.retain(|label, marker| {
            if Some(label) == confirmed.as_ref() {
                return true;
            }
            let distance = marker.location.dist(sensor_location);
            let in_fov = Complex::direction(sensor_location, marker.location)
                .is_close_to(sensor_direction, fov);
            if !in_fov {
                return true;
            }
            if distance < range {
                // the sensor swept through its place and saw nothing
                debug!("marker {label}: evicted (unconfirmed at {distance:.2} m)");
                return false;
            }
            // in view but out of range: weaken, drop when exhausted
            let dt = t.saturating_sub(marker.clean_time) as f64;
            marker.weight *= (-dt / self.config.weight_decay_ms).exp();
            marker.clean_time = t;
            marker.weight >= self.config.min_weight
        });
        out
    }
}
