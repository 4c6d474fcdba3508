//! robot.rs — The robot interface
//!
//! The seam between the controller and whatever is on the other end: the TCP
//! transport to the physical robot or the in-process physics simulation.
//! All methods are driven from the controller's single driver task; no
//! implementation needs interior locking.

use std::future::Future;

use wheelly_types::{Complex, WheellyMessage};

use crate::error::RobotError;

pub trait RobotApi: Send + Sync + 'static {
    /// Latest simulated clock, ms. Physical robots report the clock carried
    /// by their status messages; the simulator reports its integration
    /// accumulator.
    fn simulation_time(&self) -> u64;

    /// True when the robot paces itself in wall time (blocking transport
    /// reads); the controller then skips its own tick pacing.
    fn is_real_time(&self) -> bool {
        false
    }

    fn connect(&mut self) -> impl Future<Output = Result<(), RobotError>> + Send;

    fn configure(&mut self) -> impl Future<Output = Result<(), RobotError>> + Send;

    fn move_to(
        &mut self,
        direction: Complex,
        speed: i32,
    ) -> impl Future<Output = Result<(), RobotError>> + Send;

    fn scan(&mut self, direction: Complex) -> impl Future<Output = Result<(), RobotError>> + Send;

    fn halt(&mut self) -> impl Future<Output = Result<(), RobotError>> + Send;

    /// Advance by `dt_ms` of robot time and drain the messages emitted.
    fn tick(
        &mut self,
        dt_ms: u64,
    ) -> impl Future<Output = Result<Vec<WheellyMessage>, RobotError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), RobotError>> + Send;
}
