//! # wheelly-types
//!
//! Shared geometry and message types for the Wheelly perception core.
//!
//! These types are used by:
//! - `wheelly-core`: world modelling and the robot controller
//! - `packages/wheelly-sim`: the simulated robot producing the same streams
//!   as the physical hardware
//!
//! ## Coordinate conventions
//!
//! - World frame: local Cartesian, meters, +y = north
//! - Headings: unit vectors with the forward axis on +y ([`Complex`]),
//!   compass degrees in (−180, 180], clockwise positive
//! - Grids: row-major cells, row index increasing northward
//!
//! ## Numeric conventions
//!
//! - odometry: encoder pulses, `DISTANCE_PER_PULSE` meters each
//! - ultrasonic echoes: round-trip microseconds, `DISTANCE_SCALE` meters/µs
//! - lidar: millimeters over the wire

pub mod area;
pub mod complex;
pub mod geometry;
pub mod grid;
pub mod messages;
pub mod qvect;
pub mod spec;

pub use area::{filter_by_area, AreaExpression, CompiledArea};
pub use complex::{Complex, DEG0, DEG180, DEG270, DEG90};
pub use geometry::{sector_contains, sector_horizontal, sector_square, sector_vertical, segment, Point};
pub use grid::GridTopology;
pub use messages::{
    parse_status_line, CameraMessage, ContactsMessage, LidarMessage, MotionMessage,
    ProtocolError, ProxyMessage, RobotStatus, SupplyMessage, WheellyMessage, UNKNOWN_QR_CODE,
};
pub use qvect::QVect;
pub use spec::{RobotSpec, DISTANCE_PER_PULSE, DISTANCE_SCALE, MAX_PPS, SPEED_OF_SOUND};
