//! world.rs — World model aggregation
//!
//! The modeller consumes `RobotStatus` snapshots from the controller and
//! folds each new constituent message into the world model: proxy echoes
//! into the radar cone update, lidar hits into the point update, bumper
//! contacts into contact evidence, correlated camera+proxy pairs into the
//! marker map. Every output is a fresh immutable snapshot shared by `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use wheelly_types::{GridTopology, Point, RobotSpec, RobotStatus, DEG0};

use crate::marker::{CorrelatedCameraEvent, LabelMarker, MarkerConfig, MarkerLocator};
use crate::polar_map::PolarMap;
use crate::radar_map::{RadarConfig, RadarMap, SensorSignal};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldConfig {
    pub radar: RadarConfig,
    pub marker: MarkerConfig,
    /// Angular resolution of the polar projection.
    pub num_sectors: usize,
    /// Polar projection range, meters.
    pub max_polar_distance: f64,
    /// Minimum clearance from any obstacle for a safe point, meters.
    pub safe_distance: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            radar: RadarConfig::default(),
            marker: MarkerConfig::default(),
            num_sectors: 24,
            max_polar_distance: 3.0,
            safe_distance: 0.5,
        }
    }
}

/// One immutable snapshot of everything the robot believes about the world.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldModel {
    pub spec: RobotSpec,
    pub robot_status: RobotStatus,
    pub radar_map: RadarMap,
    pub markers: HashMap<String, LabelMarker>,
    pub polar_map: PolarMap,
    /// The radar map re-centered on the robot's cell.
    pub grid_map: RadarMap,
    /// Known-empty cell centres with safe clearance from every obstacle.
    pub safe_points: Vec<Point>,
}

pub struct WorldModeller {
    spec: RobotSpec,
    config: WorldConfig,
    locator: MarkerLocator,
    radar_map: RadarMap,
    markers: HashMap<String, LabelMarker>,
    last_proxy_time: u64,
    last_lidar_time: u64,
    last_contacts_time: u64,
    last_camera_time: u64,
}

impl WorldModeller {
    pub fn new(spec: RobotSpec, topology: GridTopology, config: WorldConfig) -> Self {
        Self {
            spec,
            config,
            locator: MarkerLocator::new(config.marker),
            radar_map: RadarMap::new(topology),
            markers: HashMap::new(),
            last_proxy_time: 0,
            last_lidar_time: 0,
            last_contacts_time: 0,
            last_camera_time: 0,
        }
    }

    /// Fold one status snapshot and produce the next world model.
    pub fn update(&mut self, status: &RobotStatus) -> WorldModel {
        if let Some(proxy) = &status.proxy {
            if proxy.simulation_time > self.last_proxy_time {
                let signal = SensorSignal {
                    location: proxy.location(),
                    direction: proxy.sensor_direction(),
                    distance: proxy.echo_distance(),
                    timestamp: proxy.simulation_time,
                };
                self.radar_map = self.radar_map.update(&signal, &self.spec, &self.config.radar);
                self.last_proxy_time = proxy.simulation_time;
            }
        }

        if let Some(lidar) = &status.lidar {
            if lidar.simulation_time > self.last_lidar_time {
                let signal = SensorSignal {
                    location: lidar.location(),
                    direction: lidar.head_direction(),
                    distance: lidar.front_distance(),
                    timestamp: lidar.simulation_time,
                };
                self.radar_map = self.radar_map.update_point(&signal, &self.config.radar);
                self.last_lidar_time = lidar.simulation_time;
            }
        }

        if let (Some(contacts), Some(location), Some(direction)) =
            (&status.contacts, status.location(), status.direction())
        {
            if contacts.simulation_time > self.last_contacts_time {
                if contacts.front {
                    let p = direction.at(location, self.spec.contact_radius);
                    self.radar_map =
                        self.radar_map
                            .set_contact(p, self.spec.contact_radius, contacts.simulation_time);
                }
                if contacts.rear {
                    let p = direction.opposite().at(location, self.spec.contact_radius);
                    self.radar_map =
                        self.radar_map
                            .set_contact(p, self.spec.contact_radius, contacts.simulation_time);
                }
                self.last_contacts_time = contacts.simulation_time;
            }
        }

        if let (Some(camera), Some(proxy)) = (&status.camera, &status.proxy) {
            if camera.camera_time > self.last_camera_time {
                let event = CorrelatedCameraEvent {
                    camera: camera.clone(),
                    proxy: proxy.clone(),
                };
                self.markers = self.locator.update(&self.markers, &event, &self.spec);
                self.last_camera_time = camera.camera_time;
            }
        }

        self.radar_map = self.radar_map.clean(status.simulation_time, &self.config.radar);

        let center = status.location().unwrap_or_else(|| self.radar_map.topology().center());
        let direction = status.direction().unwrap_or(DEG0);
        let polar_map = PolarMap::from_radar(
            &self.radar_map,
            center,
            direction,
            self.config.num_sectors,
            self.config.max_polar_distance,
        );
        let grid_map = self.radar_map.recentered(center);
        let safe_points = self.safe_points();

        WorldModel {
            spec: self.spec,
            robot_status: status.clone(),
            radar_map: self.radar_map.clone(),
            markers: self.markers.clone(),
            polar_map,
            grid_map,
            safe_points,
        }
    }

    fn safe_points(&self) -> Vec<Point> {
        let obstacles: Vec<Point> = self
            .radar_map
            .cells()
            .iter()
            .filter(|c| c.is_hindrance())
            .map(|c| c.location)
            .collect();
        self.radar_map
            .cells()
            .iter()
            .filter(|c| c.is_empty())
            .filter(|c| {
                obstacles
                    .iter()
                    .all(|o| o.dist(c.location) >= self.config.safe_distance)
            })
            .map(|c| c.location)
            .collect()
    }
}

/// Run the modeller as a background task over the controller's status
/// stream. Returns the task handle and a subscription to the models.
pub fn start_world_modeller(
    mut modeller: WorldModeller,
    mut status_rx: broadcast::Receiver<Arc<RobotStatus>>,
) -> (JoinHandle<()>, broadcast::Receiver<Arc<WorldModel>>) {
    let (model_tx, model_rx) = broadcast::channel(16);
    let handle = tokio::spawn(async move {
        info!("world modeller started");
        loop {
            match status_rx.recv().await {
                Ok(status) => {
                    let model = modeller.update(&status);
                    // receivers may come and go; a send error only means
                    // nobody is listening right now
                    let _ = model_tx.send(Arc::new(model));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("world modeller lagged, skipped {n} statuses");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("world modeller stopped");
    });
    (handle, model_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelly_types::{
        parse_status_line, CameraMessage, ContactsMessage, ProxyMessage, DISTANCE_SCALE,
    };

    fn topology() -> GridTopology {
        GridTopology::new(Point::zero(), 11, 11, 0.2)
    }

    fn status_with_proxy(echo_m: f64, t: u64) -> RobotStatus {
        let motion = parse_status_line(&format!("mt {t} 0 0 0 0 0 0 1 0 0 0 0")).unwrap();
        let proxy = ProxyMessage {
            simulation_time: t,
            sensor_direction_deg: 0,
            echo_delay_us: (echo_m / DISTANCE_SCALE).round() as u64,
            x_pulses: 0.0,
            y_pulses: 0.0,
            direction_deg: 0,
        };
        RobotStatus::new(RobotSpec::DEFAULT)
            .with(&motion)
            .with(&wheelly_types::WheellyMessage::Proxy(proxy))
    }

    #[test]
    fn proxy_echo_feeds_the_radar() {
        let mut modeller =
            WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
        let model = modeller.update(&status_with_proxy(0.8, 1_000));
        assert!(model
            .radar_map
            .cell_at(Point::new(0.0, 0.8))
            .unwrap()
            .is_echogenic());
        // the front polar sector reports the obstacle
        let front = model.polar_map.sector(0);
        assert!(front.is_hindered());
    }

    #[test]
    fn stale_proxy_is_not_reprocessed() {
        let mut modeller =
            WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
        let status = status_with_proxy(0.8, 1_000);
        let first = modeller.update(&status);
        let second = modeller.update(&status);
        assert_eq!(first.radar_map, second.radar_map);
    }

    #[test]
    fn contacts_mark_the_bumper_cell() {
        let mut modeller =
            WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
        let motion = parse_status_line("mt 1000 0 0 0 0 0 0 1 0 0 0 0").unwrap();
        let contacts = ContactsMessage {
            simulation_time: 1_000,
            front: true,
            rear: false,
            can_move_forward: false,
            can_move_backward: true,
        };
        let status = RobotStatus::new(RobotSpec::DEFAULT)
            .with(&motion)
            .with(&wheelly_types::WheellyMessage::Contacts(contacts));
        let model = modeller.update(&status);
        // contact recorded one body radius ahead of the robot
        let p = Point::new(0.0, RobotSpec::DEFAULT.contact_radius);
        assert!(model.radar_map.cell_at(p).unwrap().has_contact());
    }

    #[test]
    fn correlated_camera_creates_a_marker() {
        let mut modeller =
            WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
        let camera = CameraMessage {
            camera_time: 1_000,
            label: "A".to_string(),
            direction_deg: 0,
            width: 320,
            height: 240,
        };
        let status = status_with_proxy(0.8, 1_000)
            .with(&wheelly_types::WheellyMessage::Camera(camera));
        let model = modeller.update(&status);
        assert!(model.markers.contains_key("A"));
    }

    #[test]
    fn safe_points_keep_clearance_from_obstacles() {
        let mut modeller =
            WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
        let model = modeller.update(&status_with_proxy(0.8, 1_000));
        assert!(!model.safe_points.is_empty());
        for p in &model.safe_points {
            assert!(p.dist(Point::new(0.0, 0.8)) >= WorldConfig::default().safe_distance);
        }
        // the cleared cell right before the obstacle is too close to be safe
        assert!(model
            .safe_points
            .iter()
            .all(|p| p.dist(Point::new(0.0, 0.6)) > 0.01));
    }

    #[test]
    fn grid_map_recenters_on_the_robot() {
        let mut modeller =
            WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
        let motion =
            parse_status_line("mt 1000 81.63265306122449 0 0 0 0 0 1 0 0 0 0").unwrap();
        let status = RobotStatus::new(RobotSpec::DEFAULT).with(&motion);
        let model = modeller.update(&status);
        // 81.63 pulses ≈ 0.4 m east, snapped onto the 0.2 m grid
        assert!((model.grid_map.topology().center().x - 0.4).abs() < 1e-9);
        assert_eq!(model.radar_map.topology().center(), Point::zero());
    }
}
