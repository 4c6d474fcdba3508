//! # wheelly-core
//!
//! Perception and control core of the Wheelly robot: the occupancy map
//! engine, marker fusion, world modelling, the reactive robot controller,
//! the TCP transport to the physical robot, and the data-file codec.
//!
//! ## Architecture
//!
//! One driver task per controller owns all robot IO and map mutation;
//! consumers subscribe to broadcast streams of immutable snapshots. Maps and
//! world models are value types: updates return new snapshots shared by
//! `Arc`, never mutated in place.

pub mod codec;
pub mod controller;
pub mod error;
pub mod map_cell;
pub mod marker;
pub mod polar_map;
pub mod radar_map;
pub mod robot;
pub mod transport;
pub mod world;

pub use controller::{
    ControllerConfig, ControllerStatus, InferenceFn, RobotCommand, RobotController,
};
pub use error::{CodecError, RobotError};
pub use map_cell::MapCell;
pub use marker::{CorrelatedCameraEvent, LabelMarker, MarkerConfig, MarkerLocator};
pub use polar_map::{PolarMap, PolarSector, SectorStatus};
pub use radar_map::{RadarConfig, RadarMap, SensorSignal};
pub use robot::RobotApi;
pub use transport::{TcpRobot, TcpRobotConfig};
pub use world::{start_world_modeller, WorldConfig, WorldModel, WorldModeller};
