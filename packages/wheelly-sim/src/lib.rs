//! # wheelly-sim
//!
//! Deterministic 2D physics substitute for the Wheelly robot. Exposes the
//! same message streams and `RobotApi` surface as the physical transport,
//! so the controller, the world modeller and policy code run unchanged on
//! simulated hardware.

pub mod obstacle;
pub mod sim_robot;

pub use obstacle::{Obstacle, ObstacleMap};
pub use sim_robot::{SimConfig, SimRobot};
