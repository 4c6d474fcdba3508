//! controller.rs — Reactive robot controller
//!
//! A single driver task owns the robot, the status snapshot, and every
//! stream emission; everything else talks to it through message passing.
//! The task runs the connect → configure → handle-commands machine:
//!
//! ```text
//!   Unconnected --start--> Connecting
//!   Connecting  --ok-->  Configuring      --err--> WaitingRetry
//!   Configuring --ok-->  HandlingCommands --err--> Closing
//!   HandlingCommands --command-accepted--> WaitingCommandInterval
//!   WaitingCommandInterval --interval-elapsed--> HandlingCommands
//!   HandlingCommands --tick-due--> Ticking --> HandlingCommands
//!   Closing --> WaitingRetry --retry-elapsed--> Connecting
//!   any state --shutdown--> Terminated
//! ```
//!
//! Commands live in latest-wins slots per kind (a newer move supersedes the
//! queued one); the last motion command is re-issued every command interval
//! as a keep-alive. Errors never escape the driver: they are published on
//! the error stream and steer the machine into the close/retry path.
//!
//! The watchdog compares the robot clock against the time of the last
//! received message; transports whose clock only advances with messages
//! enforce their own wall-time read deadline instead.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wheelly_types::{
    CameraMessage, Complex, ContactsMessage, LidarMessage, MotionMessage, ProxyMessage,
    RobotSpec, RobotStatus, SupplyMessage, WheellyMessage,
};

use crate::error::RobotError;
use crate::robot::RobotApi;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ControllerConfig {
    /// Tick period, ms of robot time.
    pub interval_ms: u64,
    /// Minimum spacing between inference callbacks, ms.
    pub reaction_interval_ms: u64,
    /// Minimum spacing between consecutive outbound commands, ms.
    pub command_interval_ms: u64,
    /// Wait before reconnecting after a failure, ms.
    pub connection_retry_interval_ms: u64,
    /// The robot is assumed hung after this much silence, ms.
    pub watchdog_interval_ms: u64,
    /// Wall-time scaling: sleeps divide by this factor.
    pub simulation_speed: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            reaction_interval_ms: 300,
            command_interval_ms: 600,
            connection_retry_interval_ms: 3_000,
            watchdog_interval_ms: 5_000,
            simulation_speed: 1.0,
        }
    }
}

// ── Status & commands ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ControllerStatus {
    Unconnected,
    Connecting,
    Connected,
    Configuring,
    Configured,
    HandlingCommands,
    WaitingCommandInterval,
    Ticking,
    Closing,
    WaitingRetry,
    Terminated,
}

impl ControllerStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            ControllerStatus::Unconnected => "unconnected",
            ControllerStatus::Connecting => "connecting",
            ControllerStatus::Connected => "connected",
            ControllerStatus::Configuring => "configuring",
            ControllerStatus::Configured => "configured",
            ControllerStatus::HandlingCommands => "handlingCommands",
            ControllerStatus::WaitingCommandInterval => "waitingCommandInterval",
            ControllerStatus::Ticking => "ticking",
            ControllerStatus::Closing => "closing",
            ControllerStatus::WaitingRetry => "waitingRetry",
            ControllerStatus::Terminated => "terminated",
        }
    }

    /// States in which the robot session is up and commands are accepted.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ControllerStatus::Configured
                | ControllerStatus::HandlingCommands
                | ControllerStatus::WaitingCommandInterval
                | ControllerStatus::Ticking
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RobotCommand {
    Move { direction: Complex, speed: i32 },
    Scan { direction: Complex },
    Halt,
}

#[derive(Default)]
struct CommandSlots {
    /// Newest not-yet-issued move/halt.
    pending_motion: Option<RobotCommand>,
    /// Newest not-yet-issued scan.
    pending_scan: Option<Complex>,
    /// Last issued motion command, re-issued as keep-alive.
    keep_alive: Option<RobotCommand>,
}

impl CommandSlots {
    fn has_pending(&self) -> bool {
        self.pending_motion.is_some() || self.pending_scan.is_some()
    }

    fn take(&mut self) -> Option<RobotCommand> {
        if let Some(cmd) = self.pending_motion.take() {
            self.keep_alive = Some(cmd.clone());
            return Some(cmd);
        }
        if let Some(direction) = self.pending_scan.take() {
            return Some(RobotCommand::Scan { direction });
        }
        self.keep_alive.clone()
    }
}

/// Inference callback, invoked on the driver task with the latest status.
pub type InferenceFn = Box<dyn FnMut(Arc<RobotStatus>) -> anyhow::Result<()> + Send + Sync>;

// ── Shared channel fan-out ────────────────────────────────────────────────────

struct Shared {
    status_watch: watch::Sender<ControllerStatus>,
    status_stream: broadcast::Sender<ControllerStatus>,
    shutdown_request: watch::Sender<bool>,
    shutdown_done: watch::Sender<bool>,
    motion: broadcast::Sender<MotionMessage>,
    proxy: broadcast::Sender<ProxyMessage>,
    lidar: broadcast::Sender<LidarMessage>,
    contacts: broadcast::Sender<ContactsMessage>,
    supply: broadcast::Sender<SupplyMessage>,
    camera: broadcast::Sender<CameraMessage>,
    robot_status: broadcast::Sender<Arc<RobotStatus>>,
    errors: broadcast::Sender<Arc<RobotError>>,
    commands: Mutex<CommandSlots>,
}

// ── Controller handle ─────────────────────────────────────────────────────────

pub struct RobotController {
    shared: Arc<Shared>,
    driver: JoinHandle<()>,
}

impl RobotController {
    /// Spawn the driver task over the given robot.
    pub fn start<R: RobotApi>(robot: R, spec: RobotSpec, config: ControllerConfig) -> Self {
        Self::start_with_inference(robot, spec, config, None)
    }

    pub fn start_with_inference<R: RobotApi>(
        robot: R,
        spec: RobotSpec,
        config: ControllerConfig,
        inference: Option<InferenceFn>,
    ) -> Self {
        let shared = Arc::new(Shared {
            status_watch: watch::channel(ControllerStatus::Unconnected).0,
            status_stream: broadcast::channel(256).0,
            shutdown_request: watch::channel(false).0,
            shutdown_done: watch::channel(false).0,
            motion: broadcast::channel(64).0,
            proxy: broadcast::channel(64).0,
            lidar: broadcast::channel(64).0,
            contacts: broadcast::channel(64).0,
            supply: broadcast::channel(64).0,
            camera: broadcast::channel(64).0,
            robot_status: broadcast::channel(64).0,
            errors: broadcast::channel(64).0,
            commands: Mutex::new(CommandSlots::default()),
        });
        let driver = tokio::spawn(drive(Driver {
            robot,
            config,
            shared: shared.clone(),
            inference,
            status_snapshot: Arc::new(RobotStatus::new(spec)),
            last_status: None,
            last_command_time: None,
            last_reaction_time: 0,
            last_message_time: 0,
        }));
        Self { shared, driver }
    }

    /// Current lifecycle state plus subsequent changes (late subscribers see
    /// the current value).
    pub fn read_controller_status(&self) -> watch::Receiver<ControllerStatus> {
        self.shared.status_watch.subscribe()
    }

    /// Totally-ordered stream of lifecycle transitions.
    pub fn controller_status_stream(&self) -> broadcast::Receiver<ControllerStatus> {
        self.shared.status_stream.subscribe()
    }

    pub fn current_status(&self) -> ControllerStatus {
        *self.shared.status_watch.borrow()
    }

    pub fn read_motion(&self) -> broadcast::Receiver<MotionMessage> {
        self.shared.motion.subscribe()
    }

    pub fn read_proxy(&self) -> broadcast::Receiver<ProxyMessage> {
        self.shared.proxy.subscribe()
    }

    pub fn read_lidar(&self) -> broadcast::Receiver<LidarMessage> {
        self.shared.lidar.subscribe()
    }

    pub fn read_contacts(&self) -> broadcast::Receiver<ContactsMessage> {
        self.shared.contacts.subscribe()
    }

    pub fn read_supply(&self) -> broadcast::Receiver<SupplyMessage> {
        self.shared.supply.subscribe()
    }

    pub fn read_camera(&self) -> broadcast::Receiver<CameraMessage> {
        self.shared.camera.subscribe()
    }

    pub fn read_robot_status(&self) -> broadcast::Receiver<Arc<RobotStatus>> {
        self.shared.robot_status.subscribe()
    }

    pub fn read_errors(&self) -> broadcast::Receiver<Arc<RobotError>> {
        self.shared.errors.subscribe()
    }

    /// Completes (turns true) once the driver has fully terminated.
    pub fn read_shutdown(&self) -> watch::Receiver<bool> {
        self.shared.shutdown_done.subscribe()
    }

    /// Queue a command, latest-wins per kind, reporting why it cannot be
    /// accepted.
    pub fn try_execute(&self, command: RobotCommand) -> Result<(), RobotError> {
        if *self.shared.shutdown_request.borrow() || *self.shared.shutdown_done.borrow() {
            return Err(RobotError::ShutdownInProgress);
        }
        let status = self.current_status();
        if !status.is_connected() {
            return Err(RobotError::CommandRejected(status.tag()));
        }
        let mut slots = self.shared.commands.lock().expect("command slots poisoned");
        match command {
            RobotCommand::Scan { direction } => slots.pending_scan = Some(direction),
            motion => slots.pending_motion = Some(motion),
        }
        Ok(())
    }

    /// Boolean form of [`try_execute`](Self::try_execute): commands never
    /// throw through this entry point.
    pub fn execute(&self, command: RobotCommand) -> bool {
        self.try_execute(command).is_ok()
    }

    pub fn move_to(&self, direction: Complex, speed: i32) -> bool {
        self.execute(RobotCommand::Move { direction, speed })
    }

    pub fn scan(&self, direction: Complex) -> bool {
        self.execute(RobotCommand::Scan { direction })
    }

    pub fn halt(&self) -> bool {
        self.execute(RobotCommand::Halt)
    }

    /// Request termination. Idempotent; streams stop after the driver winds
    /// down and `read_shutdown` completes.
    pub fn shutdown(&self) {
        self.shared.shutdown_request.send_replace(true);
    }

    /// Wait until the driver has fully terminated.
    pub async fn join_shutdown(&self) {
        let mut rx = self.read_shutdown();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn abort(&self) {
        self.driver.abort();
    }
}

// ── Driver task ───────────────────────────────────────────────────────────────

struct Driver<R: RobotApi> {
    robot: R,
    config: ControllerConfig,
    shared: Arc<Shared>,
    inference: Option<InferenceFn>,
    status_snapshot: Arc<RobotStatus>,
    last_status: Option<ControllerStatus>,
    /// Robot time of the last issued command, ms.
    last_command_time: Option<u64>,
    /// Robot time of the last inference callback, ms.
    last_reaction_time: u64,
    /// Robot time of the last received message, ms.
    last_message_time: u64,
}

enum SessionEnd {
    Shutdown,
    Retry,
}

impl<R: RobotApi> Driver<R> {
    fn set_status(&mut self, status: ControllerStatus) {
        if self.last_status == Some(status) {
            return;
        }
        debug!("controller: {}", status.tag());
        self.last_status = Some(status);
        // send_replace keeps the current value fresh even with no subscribers
        self.shared.status_watch.send_replace(status);
        let _ = self.shared.status_stream.send(status);
    }

    fn publish_error(&self, error: RobotError) {
        warn!("controller error: {error}");
        let _ = self.shared.errors.send(Arc::new(error));
    }

    fn publish_message(&mut self, message: WheellyMessage) {
        self.last_message_time = self.last_message_time.max(message.simulation_time());
        self.status_snapshot = Arc::new((*self.status_snapshot).clone().with(&message));
        match message {
            WheellyMessage::Motion(m) => drop(self.shared.motion.send(m)),
            WheellyMessage::Proxy(m) => drop(self.shared.proxy.send(m)),
            WheellyMessage::Lidar(m) => drop(self.shared.lidar.send(m)),
            WheellyMessage::Contacts(m) => drop(self.shared.contacts.send(m)),
            WheellyMessage::Supply(m) => drop(self.shared.supply.send(m)),
            WheellyMessage::Camera(m) => drop(self.shared.camera.send(m)),
        }
    }

    fn publish_robot_status(&mut self) {
        let stamped = Arc::new(
            (*self.status_snapshot)
                .clone()
                .at_time(self.robot.simulation_time()),
        );
        self.status_snapshot = stamped.clone();
        let _ = self.shared.robot_status.send(stamped);
    }

    fn scaled(&self, ms: u64) -> Duration {
        let speed = self.config.simulation_speed.max(1e-3);
        Duration::from_secs_f64(ms as f64 / 1000.0 / speed)
    }

    /// Sleep `ms` scaled by the simulation speed; true when shutdown fired.
    async fn sleep_or_shutdown(&self, ms: u64, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.scaled(ms)) => *shutdown.borrow(),
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    async fn issue(&mut self, command: &RobotCommand) -> Result<(), RobotError> {
        match command {
            RobotCommand::Move { direction, speed } => {
                self.robot.move_to(*direction, *speed).await
            }
            RobotCommand::Scan { direction } => self.robot.scan(*direction).await,
            RobotCommand::Halt => self.robot.halt().await,
        }
    }

    /// Close the robot and wait out the retry interval.
    async fn recover(&mut self, shutdown: &mut watch::Receiver<bool>) {
        self.set_status(ControllerStatus::Closing);
        if let Err(e) = self.robot.close().await {
            debug!("close failed during recovery: {e}");
        }
        self.set_status(ControllerStatus::WaitingRetry);
        self.sleep_or_shutdown(self.config.connection_retry_interval_ms, shutdown)
            .await;
    }

    /// One connected session: handle commands and tick until failure or
    /// shutdown.
    async fn run_session(&mut self, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        self.last_command_time = None;
        self.last_reaction_time = 0;
        self.last_message_time = self.robot.simulation_time();
        {
            let mut slots = self.shared.commands.lock().expect("command slots poisoned");
            *slots = CommandSlots::default();
        }
        self.publish_robot_status();

        loop {
            if *shutdown.borrow() {
                return SessionEnd::Shutdown;
            }
            self.set_status(ControllerStatus::HandlingCommands);

            let now = self.robot.simulation_time();
            let command_due = self
                .last_command_time
                .map_or(true, |t| now >= t + self.config.command_interval_ms);
            if command_due {
                let command = self
                    .shared
                    .commands
                    .lock()
                    .expect("command slots poisoned")
                    .take();
                if let Some(command) = command {
                    if let Err(e) = self.issue(&command).await {
                        self.publish_error(e);
                        return SessionEnd::Retry;
                    }
                    self.last_command_time = Some(now);
                    self.set_status(ControllerStatus::WaitingCommandInterval);
                }
            } else if self
                .shared
                .commands
                .lock()
                .expect("command slots poisoned")
                .has_pending()
            {
                self.set_status(ControllerStatus::WaitingCommandInterval);
            }

            self.set_status(ControllerStatus::Ticking);
            match self.robot.tick(self.config.interval_ms).await {
                Ok(messages) => {
                    let received = !messages.is_empty();
                    for message in messages {
                        self.publish_message(message);
                    }
                    if received {
                        self.publish_robot_status();
                    }

                    let now = self.robot.simulation_time();
                    if now.saturating_sub(self.last_reaction_time)
                        >= self.config.reaction_interval_ms
                    {
                        if let Some(callback) = self.inference.as_mut() {
                            self.last_reaction_time = now;
                            if let Err(e) = callback(self.status_snapshot.clone()) {
                                self.publish_error(RobotError::Inference(e.to_string()));
                            }
                        }
                    }

                    if now.saturating_sub(self.last_message_time)
                        > self.config.watchdog_interval_ms
                    {
                        self.publish_error(RobotError::Timeout(
                            now.saturating_sub(self.last_message_time),
                        ));
                        return SessionEnd::Retry;
                    }
                }
                Err(e) => {
                    self.publish_error(e);
                    return SessionEnd::Retry;
                }
            }
            self.set_status(ControllerStatus::HandlingCommands);

            if !self.robot.is_real_time()
                && self
                    .sleep_or_shutdown(self.config.interval_ms, shutdown)
                    .await
            {
                return SessionEnd::Shutdown;
            }
        }
    }
}

async fn drive<R: RobotApi>(mut driver: Driver<R>) {
    let mut shutdown = driver.shared.shutdown_request.subscribe();
    driver.set_status(ControllerStatus::Unconnected);

    loop {
        if *shutdown.borrow() {
            break;
        }
        driver.set_status(ControllerStatus::Connecting);
        if let Err(e) = driver.robot.connect().await {
            driver.publish_error(e);
            driver.set_status(ControllerStatus::WaitingRetry);
            driver
                .sleep_or_shutdown(driver.config.connection_retry_interval_ms, &mut shutdown)
                .await;
            continue;
        }
        driver.set_status(ControllerStatus::Connected);
        info!("robot connected");

        driver.set_status(ControllerStatus::Configuring);
        if let Err(e) = driver.robot.configure().await {
            driver.publish_error(e);
            driver.recover(&mut shutdown).await;
            continue;
        }
        driver.set_status(ControllerStatus::Configured);
        info!("robot configured");

        match driver.run_session(&mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Retry => driver.recover(&mut shutdown).await,
        }
    }

    if let Err(e) = driver.robot.close().await {
        debug!("close failed during shutdown: {e}");
    }
    driver.set_status(ControllerStatus::Terminated);
    info!("controller terminated");
    driver.shared.shutdown_done.send_replace(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wheelly_types::DEG90;

    // ── Mock robot ────────────────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct MockLog {
        moves: Arc<Mutex<Vec<(i32, i32)>>>,
        scans: Arc<Mutex<Vec<i32>>>,
        halts: Arc<AtomicUsize>,
        connects: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    struct MockRobot {
        log: MockLog,
        time: u64,
        message_every_ms: u64,
        fail_connects: usize,
        silent_after: Option<u64>,
    }

    impl MockRobot {
        fn new(log: MockLog) -> Self {
            Self {
                log,
                time: 0,
                message_every_ms: 500,
                fail_connects: 0,
                silent_after: None,
            }
        }

        fn motion(&self) -> WheellyMessage {
            WheellyMessage::Motion(MotionMessage {
                simulation_time: self.time,
                x_pulses: 0.0,
                y_pulses: 0.0,
                direction_deg: 0,
                left_pps: 0.0,
                right_pps: 0.0,
                imu_failure: 0,
                can_move: true,
                left_power: 0,
                right_power: 0,
                left_target_pps: 0.0,
                right_target_pps: 0.0,
            })
        }
    }

    impl RobotApi for MockRobot {
        fn simulation_time(&self) -> u64 {
            self.time
        }

        fn connect(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
            let attempt = self.log.connects.fetch_add(1, Ordering::SeqCst);
            let fail = attempt < self.fail_connects;
            async move {
                if fail {
                    Err(RobotError::Transport(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "mock refused",
                    )))
                } else {
                    Ok(())
                }
            }
        }

        fn configure(
            &mut self,
        ) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
            async { Ok(()) }
        }

        fn move_to(
            &mut self,
            direction: Complex,
            speed: i32,
        ) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
            self.log
                .moves
                .lock()
                .unwrap()
                .push((direction.to_int_deg(), speed));
            async { Ok(()) }
        }

        fn scan(
            &mut self,
            direction: Complex,
        ) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
            self.log.scans.lock().unwrap().push(direction.to_int_deg());
            async { Ok(()) }
        }

        fn halt(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
            self.log.halts.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }

        fn tick(
            &mut self,
            dt_ms: u64,
        ) -> impl std::future::Future<Output = Result<Vec<WheellyMessage>, RobotError>> + Send
        {
            self.time += dt_ms;
            let silent = self.silent_after.map_or(false, |s| self.time > s);
            let due = self.time % self.message_every_ms == 0;
            let messages = if due && !silent {
                vec![self.motion()]
            } else {
                Vec::new()
            };
            async move { Ok(messages) }
        }

        fn close(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
            self.log.closes.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }
    }

    fn config() -> ControllerConfig {
        ControllerConfig::default()
    }

    async fn wait_connected(controller: &RobotController) {
        let mut rx = controller.read_controller_status();
        while !rx.borrow().is_connected() {
            rx.changed().await.unwrap();
        }
    }

    fn drain_status(rx: &mut broadcast::Receiver<ControllerStatus>) -> Vec<ControllerStatus> {
        let mut seen = Vec::new();
        while let Ok(s) = rx.try_recv() {
            seen.push(s);
        }
        seen
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn happy_path_reaches_configured_in_order() {
        let log = MockLog::default();
        let controller = RobotController::start(
            MockRobot::new(log.clone()),
            RobotSpec::DEFAULT,
            config(),
        );
        let mut status_rx = controller.controller_status_stream();
        wait_connected(&controller).await;

        let seen = drain_status(&mut status_rx);
        let expected_prefix = [
            ControllerStatus::Unconnected,
            ControllerStatus::Connecting,
            ControllerStatus::Connected,
            ControllerStatus::Configuring,
            ControllerStatus::Configured,
        ];
        assert!(
            seen.len() >= expected_prefix.len() && seen[..5] == expected_prefix,
            "unexpected transitions: {seen:?}"
        );
        controller.shutdown();
        controller.join_shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn move_command_repeats_every_command_interval() {
        let log = MockLog::default();
        let controller = RobotController::start(
            MockRobot::new(log.clone()),
            RobotSpec::DEFAULT,
            config(),
        );
        let mut status_rx = controller.read_robot_status();
        wait_connected(&controller).await;
        assert!(controller.move_to(DEG90, 10));

        // collect statuses over 5 simulated seconds
        let mut times = Vec::new();
        loop {
            let status = status_rx.recv().await.unwrap();
            times.push(status.simulation_time);
            if status.simulation_time >= 5_000 {
                break;
            }
        }
        controller.shutdown();
        controller.join_shutdown().await;

        // monotone clock, one status per message boundary
        assert_eq!(times[0], 0);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            &times[1..],
            (1u64..=10).map(|k| k * 500).collect::<Vec<_>>().as_slice()
        );

        // the move is re-issued at least once per command interval
        let moves = log.moves.lock().unwrap().clone();
        assert!(moves.len() >= 7, "only {} moves issued", moves.len());
        assert!(moves.iter().all(|&m| m == (90, 10)));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_supersedes_scan_latest_wins() {
        let log = MockLog::default();
        let controller = RobotController::start(
            MockRobot::new(log.clone()),
            RobotSpec::DEFAULT,
            config(),
        );
        wait_connected(&controller).await;
        // enqueue two scans inside one command window: only the last goes out
        assert!(controller.scan(Complex::from_deg(30.0)));
        assert!(controller.scan(Complex::from_deg(-45.0)));

        let mut status_rx = controller.read_robot_status();
        while status_rx.recv().await.unwrap().simulation_time < 1_500 {}
        controller.shutdown();
        controller.join_shutdown().await;

        let scans = log.scans.lock().unwrap().clone();
        assert_eq!(scans.first(), Some(&-45));
        assert!(!scans.contains(&30));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_rejected_while_disconnected() {
        let log = MockLog::default();
        let mut robot = MockRobot::new(log.clone());
        robot.fail_connects = usize::MAX;
        let controller = RobotController::start(robot, RobotSpec::DEFAULT, config());
        assert!(!controller.move_to(DEG90, 10));
        assert!(matches!(
            controller.try_execute(RobotCommand::Halt),
            Err(RobotError::CommandRejected(_))
        ));
        controller.shutdown();
        assert!(matches!(
            controller.try_execute(RobotCommand::Halt),
            Err(RobotError::ShutdownInProgress)
        ));
        controller.join_shutdown().await;
        assert!(log.moves.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_retries_and_surfaces_errors() {
        let log = MockLog::default();
        let mut robot = MockRobot::new(log.clone());
        robot.fail_connects = 2;
        let controller = RobotController::start(robot, RobotSpec::DEFAULT, config());
        let mut errors = controller.read_errors();
        let mut status_rx = controller.controller_status_stream();

        wait_connected(&controller).await;
        let seen = drain_status(&mut status_rx);
        assert!(seen.contains(&ControllerStatus::WaitingRetry));
        assert_eq!(log.connects.load(Ordering::SeqCst), 3);

        let first = errors.recv().await.unwrap();
        assert!(matches!(*first, RobotError::Transport(_)));
        controller.shutdown();
        controller.join_shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_closes_a_silent_robot() {
        let log = MockLog::default();
        let mut robot = MockRobot::new(log.clone());
        robot.silent_after = Some(500);
        let controller = RobotController::start(robot, RobotSpec::DEFAULT, config());
        let mut errors = controller.read_errors();
        wait_connected(&controller).await;

        let error = errors.recv().await.unwrap();
        assert!(matches!(*error, RobotError::Timeout(_)));
        // the session was closed and a reconnect attempted
        let mut status_rx = controller.read_controller_status();
        loop {
            let s = *status_rx.borrow();
            if s == ControllerStatus::WaitingRetry || s == ControllerStatus::Connecting {
                break;
            }
            status_rx.changed().await.unwrap();
        }
        assert!(log.closes.load(Ordering::SeqCst) >= 1);
        controller.shutdown();
        controller.join_shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn inference_is_throttled_to_reaction_interval() {
        let log = MockLog::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_cb = calls.clone();
        let cfg = ControllerConfig {
            reaction_interval_ms: 1_000,
            ..config()
        };
        let controller = RobotController::start_with_inference(
            MockRobot::new(log),
            RobotSpec::DEFAULT,
            cfg,
            Some(Box::new(move |_status| {
                calls_in_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        );
        let mut status_rx = controller.read_robot_status();
        wait_connected(&controller).await;
        while status_rx.recv().await.unwrap().simulation_time < 5_000 {}
        controller.shutdown();
        controller.join_shutdown().await;

        let n = calls.load(Ordering::SeqCst);
        assert!((4..=7).contains(&n), "expected ~5 callbacks, got {n}");
    }

    #[tokio::test(start_paused = true)]
    async fn inference_errors_are_published_and_survived() {
        let log = MockLog::default();
        let controller = RobotController::start_with_inference(
            MockRobot::new(log),
            RobotSpec::DEFAULT,
            config(),
            Some(Box::new(|_status| anyhow::bail!("policy exploded"))),
        );
        let mut errors = controller.read_errors();
        wait_connected(&controller).await;
        let error = errors.recv().await.unwrap();
        assert!(matches!(*error, RobotError::Inference(_)));
        // the controller keeps running
        assert!(controller.current_status().is_connected());
        controller.shutdown();
        controller.join_shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_idempotent_and_completes() {
        let log = MockLog::default();
        let controller = RobotController::start(
            MockRobot::new(log.clone()),
            RobotSpec::DEFAULT,
            config(),
        );
        wait_connected(&controller).await;
        controller.shutdown();
        controller.shutdown();
        controller.join_shutdown().await;
        assert_eq!(controller.current_status(), ControllerStatus::Terminated);
        assert!(log.closes.load(Ordering::SeqCst) >= 1);
        // no commands are accepted afterwards
        assert!(!controller.move_to(DEG90, 10));
    }
}
