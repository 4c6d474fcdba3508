//! sim_robot.rs — Deterministic 2D physics robot
//!
//! Produces the same message stream as the physical robot from a small
//! rigid-body model stepped at a fixed Δt:
//! - yaw slews toward the commanded heading at the angular speed limit
//! - wheel speed ramps at `1/DISTANCE_PER_PULSE` pulses/s² up to `MAX_PPS`
//! - circle-vs-circle collision stalls motion and raises a contact
//! - the ultrasonic echo raycasts the nearest obstacle in the receptive cone
//! - a stalemate watchdog reports a logical contact when commanded motion
//!   produces no displacement
//!
//! Motion, proxy, contacts and supply go out at `message_interval`
//! boundaries; camera events at `camera_interval` boundaries. All noise
//! draws come from a seeded generator, so equal seeds replay equal runs.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use wheelly_core::error::RobotError;
use wheelly_core::robot::RobotApi;
use wheelly_types::{
    CameraMessage, Complex, ContactsMessage, MotionMessage, Point, ProxyMessage, RobotSpec,
    SupplyMessage, WheellyMessage, DEG0, DISTANCE_PER_PULSE, DISTANCE_SCALE, MAX_PPS,
    UNKNOWN_QR_CODE,
};

use crate::obstacle::ObstacleMap;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimConfig {
    /// Spacing of motion/proxy/contacts/supply messages, ms.
    pub message_interval_ms: u64,
    /// Spacing of camera events, ms.
    pub camera_interval_ms: u64,
    /// Commanded-but-motionless time before a logical contact, ms.
    pub stalemate_interval_ms: u64,
    /// Yaw slew limit, degrees per second.
    pub max_angular_speed_deg_s: f64,
    /// Camera cone half-width, degrees.
    pub camera_half_fov_deg: f64,
    /// Sensor head swing limit, degrees each side.
    pub max_head_deg: f64,
    /// Gaussian echo distance noise, meters. 0 disables the draw.
    pub echo_sigma_m: f64,
    /// Reported battery voltage, millivolts.
    pub voltage_mv: u32,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            message_interval_ms: 500,
            camera_interval_ms: 1_000,
            stalemate_interval_ms: 2_000,
            max_angular_speed_deg_s: 90.0,
            camera_half_fov_deg: 20.0,
            max_head_deg: 90.0,
            echo_sigma_m: 0.0,
            voltage_mv: 7_400,
            seed: 1_234,
        }
    }
}

// ── Simulated robot ───────────────────────────────────────────────────────────

pub struct SimRobot {
    spec: RobotSpec,
    config: SimConfig,
    obstacles: ObstacleMap,
    rng: StdRng,
    time: u64,
    location: Point,
    yaw: Complex,
    head: Complex,
    target_yaw: Complex,
    target_pps: f64,
    speed_pps: f64,
    contact_front: bool,
    contact_rear: bool,
    stalled_ms: u64,
    next_message_at: u64,
    next_camera_at: u64,
}

impl SimRobot {
    pub fn new(spec: RobotSpec, config: SimConfig, obstacles: ObstacleMap) -> Self {
        Self {
            spec,
            rng: StdRng::seed_from_u64(config.seed),
            next_message_at: config.message_interval_ms,
            next_camera_at: config.camera_interval_ms,
            config,
            obstacles,
            time: 0,
            location: Point::zero(),
            yaw: DEG0,
            head: DEG0,
            target_yaw: DEG0,
            target_pps: 0.0,
            speed_pps: 0.0,
            contact_front: false,
            contact_rear: false,
            stalled_ms: 0,
        }
    }

    /// Start from a given pose instead of the origin.
    pub fn with_pose(mut self, location: Point, yaw: Complex) -> Self {
        self.location = location;
        self.yaw = yaw;
        self.target_yaw = yaw;
        self
    }

    pub fn location(&self) -> Point {
        self.location
    }

    pub fn yaw(&self) -> Complex {
        self.yaw
    }

    pub fn head(&self) -> Complex {
        self.head
    }

    pub fn speed_pps(&self) -> f64 {
        self.speed_pps
    }

    pub fn apply_move(&mut self, direction: Complex, speed: f64) {
        self.target_yaw = direction;
        self.target_pps = speed.clamp(-MAX_PPS, MAX_PPS);
    }

    pub fn apply_scan(&mut self, direction: Complex) {
        let clamped = direction
            .to_deg()
            .clamp(-self.config.max_head_deg, self.config.max_head_deg);
        self.head = Complex::from_deg(clamped);
    }

    pub fn apply_halt(&mut self) {
        self.target_pps = 0.0;
        self.target_yaw = self.yaw;
    }

    /// One fixed physics step of `dt_ms`, returning the messages it emits.
    pub fn step(&mut self, dt_ms: u64) -> Vec<WheellyMessage> {
        let dt = dt_ms as f64 / 1000.0;
        self.time += dt_ms;
        let mut out = Vec::new();

        // yaw slew toward the commanded heading, shortest way around
        let diff = self.target_yaw.sub(self.yaw).to_deg();
        let max_turn = self.config.max_angular_speed_deg_s * dt;
        self.yaw = self.yaw.add(Complex::from_deg(diff.clamp(-max_turn, max_turn)));

        // wheel speed ramp at the acceleration limit
        let max_delta = dt / DISTANCE_PER_PULSE;
        let delta = (self.target_pps - self.speed_pps).clamp(-max_delta, max_delta);
        self.speed_pps += delta;

        // integrate, then collide against the disk map
        let travel = self.speed_pps * DISTANCE_PER_PULSE * dt;
        let next = self.yaw.at(self.location, travel);
        let mut contact_event = false;
        let collided = self.obstacles.collision(next, self.spec.contact_radius).is_some();
        if collided {
            let forward = travel >= 0.0;
            contact_event = !(self.contact_front || self.contact_rear);
            self.contact_front = forward;
            self.contact_rear = !forward;
            self.speed_pps = 0.0;
            if contact_event {
                debug!("sim: contact at t={} ({:?})", self.time, self.location);
            }
        } else {
            self.location = next;
            self.contact_front = false;
            self.contact_rear = false;
        }

        // stalemate watchdog: commanded but not moving
        if self.target_pps != 0.0 && (collided || travel.abs() < 1e-9) {
            self.stalled_ms += dt_ms;
            if self.stalled_ms >= self.config.stalemate_interval_ms {
                self.stalled_ms = 0;
                self.contact_front = self.target_pps >= 0.0;
                self.contact_rear = self.target_pps < 0.0;
                contact_event = true;
                debug!("sim: stalemate contact at t={}", self.time);
            }
        } else {
            self.stalled_ms = 0;
        }

        if contact_event {
            out.push(self.contacts_message());
        }

        while self.time >= self.next_message_at {
            out.push(self.motion_message());
            out.push(self.proxy_message());
            out.push(self.contacts_message());
            out.push(self.supply_message());
            self.next_message_at += self.config.message_interval_ms;
        }
        while self.time >= self.next_camera_at {
            out.push(self.camera_message());
            self.next_camera_at += self.config.camera_interval_ms;
        }
        out
    }

    fn motion_message(&self) -> WheellyMessage {
        let power = (self.speed_pps / MAX_PPS * 255.0) as i32;
        WheellyMessage::Motion(MotionMessage {
            simulation_time: self.time,
            x_pulses: self.location.x / DISTANCE_PER_PULSE,
            y_pulses: self.location.y / DISTANCE_PER_PULSE,
            direction_deg: self.yaw.to_int_deg(),
            left_pps: self.speed_pps,
            right_pps: self.speed_pps,
            imu_failure: 0,
            can_move: !self.contact_front,
            left_power: power,
            right_power: power,
            left_target_pps: self.target_pps,
            right_target_pps: self.target_pps,
        })
    }

    fn proxy_message(&mut self) -> WheellyMessage {
        let beam = self.yaw.add(self.head);
        let mut distance = self
            .obstacles
            .nearest_in_cone(
                self.location,
                beam,
                self.spec.receptive_angle(),
                self.spec.max_radar_distance,
            )
            .map(|(_, d)| d)
            .unwrap_or(0.0);
        if distance > 0.0 && self.config.echo_sigma_m > 0.0 {
            let noise = Normal::new(0.0, self.config.echo_sigma_m)
                .expect("valid sigma")
                .sample(&mut self.rng);
            distance = (distance + noise).max(0.01);
        }
        WheellyMessage::Proxy(ProxyMessage {
            simulation_time: self.time,
            sensor_direction_deg: self.head.to_int_deg(),
            echo_delay_us: (distance / DISTANCE_SCALE).round() as u64,
            x_pulses: self.location.x / DISTANCE_PER_PULSE,
            y_pulses: self.location.y / DISTANCE_PER_PULSE,
            direction_deg: self.yaw.to_int_deg(),
        })
    }

    fn contacts_message(&self) -> WheellyMessage {
        WheellyMessage::Contacts(ContactsMessage {
            simulation_time: self.time,
            front: self.contact_front,
            rear: self.contact_rear,
            can_move_forward: !self.contact_front,
            can_move_backward: !self.contact_rear,
        })
    }

    fn supply_message(&self) -> WheellyMessage {
        WheellyMessage::Supply(SupplyMessage {
            simulation_time: self.time,
            voltage_mv: self.config.voltage_mv,
        })
    }

    fn camera_message(&self) -> WheellyMessage {
        let beam = self.yaw.add(self.head);
        let seen = self.obstacles.nearest_labeled_in_cone(
            self.location,
            beam,
            self.config.camera_half_fov_deg.to_radians(),
            self.spec.max_radar_distance,
        );
        let (label, direction_deg) = match seen {
            Some((obstacle, _)) => {
                let offset = Complex::direction(self.location, obstacle.center).sub(beam);
                (
                    obstacle.label.clone().unwrap_or_default(),
                    offset.to_int_deg(),
                )
            }
            None => (UNKNOWN_QR_CODE.to_string(), 0),
        };
        WheellyMessage::Camera(CameraMessage {
            camera_time: self.time,
            label,
            direction_deg,
            width: 320,
            height: 240,
        })
    }
}

// ── Robot interface ───────────────────────────────────────────────────────────

impl RobotApi for SimRobot {
    fn simulation_time(&self) -> u64 {
        self.time
    }

    fn connect(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async { Ok(()) }
    }

    fn configure(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async { Ok(()) }
    }

    fn move_to(
        &mut self,
        direction: Complex,
        speed: i32,
    ) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        self.apply_move(direction, speed as f64);
        async { Ok(()) }
    }

    fn scan(&mut self, direction: Complex) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        self.apply_scan(direction);
        async { Ok(()) }
    }

    fn halt(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        self.apply_halt();
        async { Ok(()) }
    }

    fn tick(
        &mut self,
        dt_ms: u64,
    ) -> impl std::future::Future<Output = Result<Vec<WheellyMessage>, RobotError>> + Send {
        let messages = self.step(dt_ms);
        async move { Ok(messages) }
    }

    fn close(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        self.apply_halt();
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot(obstacles: ObstacleMap) -> SimRobot {
        SimRobot::new(RobotSpec::DEFAULT, SimConfig::default(), obstacles)
    }

    fn run(r: &mut SimRobot, steps: usize) -> Vec<WheellyMessage> {
        let mut out = Vec::new();
        for _ in 0..steps {
            out.extend(r.step(100));
        }
        out
    }

    #[test]
    fn speed_ramps_at_the_acceleration_limit() {
        let mut r = robot(ObstacleMap::empty());
        r.apply_move(DEG0, 60.0);
        r.step(100);
        let per_step = 0.1 / DISTANCE_PER_PULSE;
        assert!((r.speed_pps() - per_step).abs() < 1e-9);
        r.step(100);
        r.step(100);
        // 3 × 20.4 pps exceeds the 60 pps cap
        assert!((r.speed_pps() - 60.0).abs() < 1e-9);
        assert!(r.location().y > 0.0);
        assert!((r.location().x).abs() < 1e-9);
    }

    #[test]
    fn yaw_slews_at_the_angular_limit() {
        let mut r = robot(ObstacleMap::empty());
        r.apply_move(Complex::from_deg(90.0), 0.0);
        for _ in 0..5 {
            r.step(100);
        }
        assert_eq!(r.yaw().to_int_deg(), 45);
        for _ in 0..5 {
            r.step(100);
        }
        assert_eq!(r.yaw().to_int_deg(), 90);
    }

    #[test]
    fn halt_ramps_back_to_rest() {
        let mut r = robot(ObstacleMap::empty());
        r.apply_move(DEG0, 60.0);
        run(&mut r, 5);
        r.apply_halt();
        run(&mut r, 5);
        assert_eq!(r.speed_pps(), 0.0);
    }

    #[test]
    fn scan_clamps_to_the_head_range() {
        let mut r = robot(ObstacleMap::empty());
        r.apply_scan(Complex::from_deg(150.0));
        assert_eq!(r.head().to_int_deg(), 90);
        r.apply_scan(Complex::from_deg(-30.0));
        assert_eq!(r.head().to_int_deg(), -30);
    }

    #[test]
    fn messages_come_out_at_interval_boundaries() {
        let mut r = robot(ObstacleMap::empty());
        let first = run(&mut r, 5);
        // one batch at t=500: motion, proxy, contacts, supply
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|m| m.simulation_time() == 500));
        let second = run(&mut r, 5);
        // t=1000 adds the camera event
        assert_eq!(second.len(), 5);
        assert!(matches!(second[4], WheellyMessage::Camera(_)));
    }

    #[test]
    fn echo_reports_the_obstacle_surface() {
        let mut r = robot(ObstacleMap::empty().with_disk(0.0, 1.0, 0.2));
        let messages = run(&mut r, 5);
        let proxy = messages
            .iter()
            .find_map(|m| match m {
                WheellyMessage::Proxy(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert!((proxy.echo_distance() - 0.8).abs() < 1e-3);
    }

    #[test]
    fn clear_beam_reports_no_echo() {
        let mut r = robot(ObstacleMap::empty().with_disk(0.0, 5.0, 0.2));
        let messages = run(&mut r, 5);
        let proxy = messages
            .iter()
            .find_map(|m| match m {
                WheellyMessage::Proxy(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(proxy.echo_distance(), 0.0);
    }

    #[test]
    fn collision_stalls_and_raises_a_contact() {
        let mut r = robot(ObstacleMap::empty().with_disk(0.0, 0.8, 0.2));
        r.apply_move(DEG0, 60.0);
        let messages = run(&mut r, 30);
        let contact = messages
            .iter()
            .find_map(|m| match m {
                WheellyMessage::Contacts(c) if c.front => Some(c),
                _ => None,
            })
            .expect("a front contact event");
        assert!(!contact.can_move_forward);
        assert!(contact.can_move_backward);
        // stopped at the obstacle surface, not inside it
        assert!(r.location().y <= 0.8 - 0.2 - RobotSpec::DEFAULT.contact_radius + 1e-6);
        assert_eq!(r.speed_pps(), 0.0);
    }

    #[test]
    fn pushing_against_a_wall_repeats_the_logical_contact() {
        let mut r = robot(ObstacleMap::empty().with_disk(0.0, 0.8, 0.2));
        r.apply_move(DEG0, 60.0);
        let messages = run(&mut r, 60);
        let contact_events: Vec<u64> = messages
            .iter()
            .filter_map(|m| match m {
                WheellyMessage::Contacts(c) if c.front && c.simulation_time % 500 != 0 => {
                    Some(c.simulation_time)
                }
                _ => None,
            })
            .collect();
        // the collision event plus at least one stalemate reminder
        assert!(contact_events.len() >= 2, "events: {contact_events:?}");
    }

    #[test]
    fn camera_labels_the_nearest_marker() {
        let mut r = robot(
            ObstacleMap::empty()
                .with_labeled("A", 0.0, 1.0, 0.15)
                .with_disk(0.0, 0.5, 0.05),
        );
        let messages = run(&mut r, 10);
        let camera = messages
            .iter()
            .find_map(|m| match m {
                WheellyMessage::Camera(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(camera.label, "A");
        assert_eq!(camera.direction_deg, 0);
    }

    #[test]
    fn camera_reports_unknown_when_nothing_is_labeled() {
        let mut r = robot(ObstacleMap::empty().with_disk(0.0, 1.0, 0.15));
        let messages = run(&mut r, 10);
        let camera = messages
            .iter()
            .find_map(|m| match m {
                WheellyMessage::Camera(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(camera.label, UNKNOWN_QR_CODE);
    }

    #[test]
    fn equal_seeds_replay_equal_runs() {
        let noisy = SimConfig {
            echo_sigma_m: 0.01,
            ..SimConfig::default()
        };
        let obstacles = ObstacleMap::empty().with_disk(0.0, 1.5, 0.2);
        let mut a = SimRobot::new(RobotSpec::DEFAULT, noisy, obstacles.clone());
        let mut b = SimRobot::new(RobotSpec::DEFAULT, noisy, obstacles);
        a.apply_move(DEG0, 20.0);
        b.apply_move(DEG0, 20.0);
        assert_eq!(run(&mut a, 20), run(&mut b, 20));
    }
}
