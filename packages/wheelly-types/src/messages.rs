//! messages.rs — Robot status messages
//!
//! Tagged variants for every kind of status line the robot emits, shared by
//! the TCP transport and the simulated robot. Wire lines are space-delimited
//! ASCII whose first token names the kind; parsers are free functions
//! dispatching on that token, formatters are their exact inverses.
//!
//! Numeric conventions: wheel odometry travels as encoder pulses
//! (`DISTANCE_PER_PULSE` meters each), lidar distances as millimeters, and
//! ultrasonic echoes as round-trip microseconds (`DISTANCE_SCALE` meters
//! per µs).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::geometry::Point;
use crate::spec::{RobotSpec, DISTANCE_PER_PULSE, DISTANCE_SCALE};

/// Camera label reported when the detector cannot identify the code.
pub const UNKNOWN_QR_CODE: &str = "?";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty status line")]
    Empty,
    #[error("unknown message tag {0:?}")]
    UnknownTag(String),
    #[error("malformed {kind} line: expected {expected} fields, got {got}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("malformed {kind} field {field}: {value:?}")]
    BadField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}

// ── Message kinds ─────────────────────────────────────────────────────────────

/// Wheel odometry and motor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionMessage {
    pub simulation_time: u64,
    pub x_pulses: f64,
    pub y_pulses: f64,
    pub direction_deg: i32,
    pub left_pps: f64,
    pub right_pps: f64,
    pub imu_failure: i32,
    pub can_move: bool,
    pub left_power: i32,
    pub right_power: i32,
    pub left_target_pps: f64,
    pub right_target_pps: f64,
}

impl MotionMessage {
    pub fn location(&self) -> Point {
        Point::new(
            self.x_pulses * DISTANCE_PER_PULSE,
            self.y_pulses * DISTANCE_PER_PULSE,
        )
    }

    pub fn direction(&self) -> Complex {
        Complex::from_deg(self.direction_deg as f64)
    }
}

/// Ultrasonic proxy sample with the robot pose at sampling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyMessage {
    pub simulation_time: u64,
    pub sensor_direction_deg: i32,
    pub echo_delay_us: u64,
    pub x_pulses: f64,
    pub y_pulses: f64,
    pub direction_deg: i32,
}

impl ProxyMessage {
    pub fn location(&self) -> Point {
        Point::new(
            self.x_pulses * DISTANCE_PER_PULSE,
            self.y_pulses * DISTANCE_PER_PULSE,
        )
    }

    pub fn direction(&self) -> Complex {
        Complex::from_deg(self.direction_deg as f64)
    }

    /// Absolute heading of the sensor head (robot yaw + head offset).
    pub fn sensor_direction(&self) -> Complex {
        self.direction()
            .add(Complex::from_deg(self.sensor_direction_deg as f64))
    }

    /// Echo distance in meters, 0 = no echo in range.
    pub fn echo_distance(&self) -> f64 {
        self.echo_delay_us as f64 * DISTANCE_SCALE
    }

    /// World point of the echo, `None` when there was no echo.
    pub fn echo_location(&self) -> Option<Point> {
        let d = self.echo_distance();
        (d > 0.0).then(|| self.sensor_direction().at(self.location(), d))
    }
}

/// Time-of-flight lidar sample (newer hardware variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarMessage {
    pub simulation_time: u64,
    pub front_mm: u32,
    pub rear_mm: u32,
    pub x_pulses: f64,
    pub y_pulses: f64,
    pub yaw_deg: i32,
    pub head_deg: i32,
}

impl LidarMessage {
    pub fn location(&self) -> Point {
        Point::new(
            self.x_pulses * DISTANCE_PER_PULSE,
            self.y_pulses * DISTANCE_PER_PULSE,
        )
    }

    pub fn front_distance(&self) -> f64 {
        self.front_mm as f64 / 1000.0
    }

    pub fn rear_distance(&self) -> f64 {
        self.rear_mm as f64 / 1000.0
    }

    pub fn head_direction(&self) -> Complex {
        Complex::from_deg((self.yaw_deg + self.head_deg) as f64)
    }
}

/// Bumper contacts and motion gates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactsMessage {
    pub simulation_time: u64,
    pub front: bool,
    pub rear: bool,
    pub can_move_forward: bool,
    pub can_move_backward: bool,
}

/// Battery voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupplyMessage {
    pub simulation_time: u64,
    pub voltage_mv: u32,
}

impl SupplyMessage {
    pub fn voltage(&self) -> f64 {
        self.voltage_mv as f64 / 1000.0
    }
}

/// Camera fiducial detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMessage {
    pub camera_time: u64,
    pub label: String,
    pub direction_deg: i32,
    pub width: i32,
    pub height: i32,
}

impl CameraMessage {
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_QR_CODE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WheellyMessage {
    Motion(MotionMessage),
    Proxy(ProxyMessage),
    Lidar(LidarMessage),
    Contacts(ContactsMessage),
    Supply(SupplyMessage),
    Camera(CameraMessage),
}

impl WheellyMessage {
    pub fn simulation_time(&self) -> u64 {
        match self {
            WheellyMessage::Motion(m) => m.simulation_time,
            WheellyMessage::Proxy(m) => m.simulation_time,
            WheellyMessage::Lidar(m) => m.simulation_time,
            WheellyMessage::Contacts(m) => m.simulation_time,
            WheellyMessage::Supply(m) => m.simulation_time,
            WheellyMessage::Camera(m) => m.camera_time,
        }
    }
}

// ── Parsers ───────────────────────────────────────────────────────────────────

fn field<T: FromStr>(
    tokens: &[&str],
    idx: usize,
    kind: &'static str,
    name: &'static str,
) -> Result<T, ProtocolError> {
    tokens[idx].parse().map_err(|_| ProtocolError::BadField {
        kind,
        field: name,
        value: tokens[idx].to_string(),
    })
}

fn flag(
    tokens: &[&str],
    idx: usize,
    kind: &'static str,
    name: &'static str,
) -> Result<bool, ProtocolError> {
    match tokens[idx] {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ProtocolError::BadField {
            kind,
            field: name,
            value: other.to_string(),
        }),
    }
}

fn expect_len(
    tokens: &[&str],
    kind: &'static str,
    expected: usize,
) -> Result<(), ProtocolError> {
    if tokens.len() != expected {
        Err(ProtocolError::FieldCount {
            kind,
            expected,
            got: tokens.len(),
        })
    } else {
        Ok(())
    }
}

pub fn parse_motion(tokens: &[&str]) -> Result<MotionMessage, ProtocolError> {
    expect_len(tokens, "motion", 12)?;
    Ok(MotionMessage {
        simulation_time: field(tokens, 0, "motion", "simTime")?,
        x_pulses: field(tokens, 1, "motion", "xPulses")?,
        y_pulses: field(tokens, 2, "motion", "yPulses")?,
        direction_deg: field(tokens, 3, "motion", "dirDeg")?,
        left_pps: field(tokens, 4, "motion", "leftSpeed")?,
        right_pps: field(tokens, 5, "motion", "rightSpeed")?,
        imu_failure: field(tokens, 6, "motion", "imu")?,
        can_move: flag(tokens, 7, "motion", "canMove")?,
        left_power: field(tokens, 8, "motion", "leftPower")?,
        right_power: field(tokens, 9, "motion", "rightPower")?,
        left_target_pps: field(tokens, 10, "motion", "leftTarget")?,
        right_target_pps: field(tokens, 11, "motion", "rightTarget")?,
    })
}

pub fn parse_proxy(tokens: &[&str]) -> Result<ProxyMessage, ProtocolError> {
    expect_len(tokens, "proxy", 6)?;
    Ok(ProxyMessage {
        simulation_time: field(tokens, 0, "proxy", "simTime")?,
        sensor_direction_deg: field(tokens, 1, "proxy", "sensorDirDeg")?,
        echo_delay_us: field(tokens, 2, "proxy", "echoDelayUs")?,
        x_pulses: field(tokens, 3, "proxy", "xPulses")?,
        y_pulses: field(tokens, 4, "proxy", "yPulses")?,
        direction_deg: field(tokens, 5, "proxy", "dirDeg")?,
    })
}

pub fn parse_lidar(tokens: &[&str]) -> Result<LidarMessage, ProtocolError> {
    expect_len(tokens, "lidar", 7)?;
    Ok(LidarMessage {
        simulation_time: field(tokens, 0, "lidar", "simTime")?,
        front_mm: field(tokens, 1, "lidar", "frontDistMm")?,
        rear_mm: field(tokens, 2, "lidar", "rearDistMm")?,
        x_pulses: field(tokens, 3, "lidar", "xPulses")?,
        y_pulses: field(tokens, 4, "lidar", "yPulses")?,
        yaw_deg: field(tokens, 5, "lidar", "yawDeg")?,
        head_deg: field(tokens, 6, "lidar", "headDeg")?,
    })
}

pub fn parse_contacts(tokens: &[&str]) -> Result<ContactsMessage, ProtocolError> {
    expect_len(tokens, "contacts", 5)?;
    Ok(ContactsMessage {
        simulation_time: field(tokens, 0, "contacts", "simTime")?,
        front: flag(tokens, 1, "contacts", "front")?,
        rear: flag(tokens, 2, "contacts", "rear")?,
        can_move_forward: flag(tokens, 3, "contacts", "canForward")?,
        can_move_backward: flag(tokens, 4, "contacts", "canBackward")?,
    })
}

pub fn parse_supply(tokens: &[&str]) -> Result<SupplyMessage, ProtocolError> {
    expect_len(tokens, "supply", 2)?;
    Ok(SupplyMessage {
        simulation_time: field(tokens, 0, "supply", "simTime")?,
        voltage_mv: field(tokens, 1, "supply", "voltageMv")?,
    })
}

pub fn parse_camera(tokens: &[&str]) -> Result<CameraMessage, ProtocolError> {
    expect_len(tokens, "camera", 5)?;
    Ok(CameraMessage {
        camera_time: field(tokens, 0, "camera", "cameraTime")?,
        label: tokens[1].to_string(),
        direction_deg: field(tokens, 2, "camera", "dirDeg")?,
        width: field(tokens, 3, "camera", "width")?,
        height: field(tokens, 4, "camera", "height")?,
    })
}

/// Parse one status line; the first token picks the kind.
pub fn parse_status_line(line: &str) -> Result<WheellyMessage, ProtocolError> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let (tag, rest) = tokens.split_first().ok_or(ProtocolError::Empty)?;
    match *tag {
        "mt" => parse_motion(rest).map(WheellyMessage::Motion),
        "px" => parse_proxy(rest).map(WheellyMessage::Proxy),
        "ld" => parse_lidar(rest).map(WheellyMessage::Lidar),
        "ct" => parse_contacts(rest).map(WheellyMessage::Contacts),
        "sv" => parse_supply(rest).map(WheellyMessage::Supply),
        "cm" => parse_camera(rest).map(WheellyMessage::Camera),
        other => Err(ProtocolError::UnknownTag(other.to_string())),
    }
}

// ── Formatters ────────────────────────────────────────────────────────────────

fn b(v: bool) -> u8 {
    v as u8
}

impl WheellyMessage {
    /// The exact wire line `parse_status_line` reads back.
    pub fn to_wire_line(&self) -> String {
        match self {
            WheellyMessage::Motion(m) => format!(
                "mt {} {} {} {} {} {} {} {} {} {} {} {}",
                m.simulation_time,
                m.x_pulses,
                m.y_pulses,
                m.direction_deg,
                m.left_pps,
                m.right_pps,
                m.imu_failure,
                b(m.can_move),
                m.left_power,
                m.right_power,
                m.left_target_pps,
                m.right_target_pps
            ),
            WheellyMessage::Proxy(m) => format!(
                "px {} {} {} {} {} {}",
                m.simulation_time,
                m.sensor_direction_deg,
                m.echo_delay_us,
                m.x_pulses,
                m.y_pulses,
                m.direction_deg
            ),
            WheellyMessage::Lidar(m) => format!(
                "ld {} {} {} {} {} {} {}",
                m.simulation_time, m.front_mm, m.rear_mm, m.x_pulses, m.y_pulses, m.yaw_deg,
                m.head_deg
            ),
            WheellyMessage::Contacts(m) => format!(
                "ct {} {} {} {} {}",
                m.simulation_time,
                b(m.front),
                b(m.rear),
                b(m.can_move_forward),
                b(m.can_move_backward)
            ),
            WheellyMessage::Supply(m) => {
                format!("sv {} {}", m.simulation_time, m.voltage_mv)
            }
            WheellyMessage::Camera(m) => format!(
                "cm {} {} {} {} {}",
                m.camera_time, m.label, m.direction_deg, m.width, m.height
            ),
        }
    }
}

// ── Robot status snapshot ─────────────────────────────────────────────────────

/// Latest message of each kind plus the robot spec and simulation clock.
/// Constituent timestamps never exceed `simulation_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub spec: RobotSpec,
    pub simulation_time: u64,
    pub motion: Option<MotionMessage>,
    pub proxy: Option<ProxyMessage>,
    pub lidar: Option<LidarMessage>,
    pub contacts: Option<ContactsMessage>,
    pub supply: Option<SupplyMessage>,
    pub camera: Option<CameraMessage>,
}

impl RobotStatus {
    pub fn new(spec: RobotSpec) -> Self {
        Self {
            spec,
            simulation_time: 0,
            motion: None,
            proxy: None,
            lidar: None,
            contacts: None,
            supply: None,
            camera: None,
        }
    }

    /// Merge one message, keeping the clock monotone.
    pub fn with(mut self, msg: &WheellyMessage) -> Self {
        self.simulation_time = self.simulation_time.max(msg.simulation_time());
        match msg {
            WheellyMessage::Motion(m) => self.motion = Some(m.clone()),
            WheellyMessage::Proxy(m) => self.proxy = Some(m.clone()),
            WheellyMessage::Lidar(m) => self.lidar = Some(m.clone()),
            WheellyMessage::Contacts(m) => self.contacts = Some(*m),
            WheellyMessage::Supply(m) => self.supply = Some(*m),
            WheellyMessage::Camera(m) => self.camera = Some(m.clone()),
        }
        self
    }

    /// Same snapshot stamped at a later clock tick.
    pub fn at_time(mut self, simulation_time: u64) -> Self {
        self.simulation_time = self.simulation_time.max(simulation_time);
        self
    }

    pub fn location(&self) -> Option<Point> {
        self.motion.as_ref().map(|m| m.location())
    }

    pub fn direction(&self) -> Option<Complex> {
        self.motion.as_ref().map(|m| m.direction())
    }

    pub fn sensor_direction(&self) -> Option<Complex> {
        self.proxy.as_ref().map(|p| p.sensor_direction())
    }

    pub fn can_move_forward(&self) -> bool {
        self.contacts.map(|c| c.can_move_forward).unwrap_or(true)
    }

    pub fn can_move_backward(&self) -> bool {
        self.contacts.map(|c| c.can_move_backward).unwrap_or(true)
    }
}
