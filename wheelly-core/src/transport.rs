//! transport.rs — Line protocol to the physical robot
//!
//! Commands go out as `mv <deg> <speed>`, `sc <deg>`, `ha`, newline
//! terminated; status lines come back space-delimited with a leading kind
//! tag and are parsed by the free functions in `wheelly_types::messages`.
//! Malformed lines are logged and dropped; IO failures and read-deadline
//! expiries surface as errors and drive the controller's retry loop.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use wheelly_types::{parse_status_line, Complex, WheellyMessage, MAX_PPS};

use crate::error::RobotError;
use crate::robot::RobotApi;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpRobotConfig {
    /// `host:port` of the robot.
    pub address: String,
    pub connect_timeout_ms: u64,
    /// The robot is assumed gone after this much line silence.
    pub read_timeout_ms: u64,
    /// Device tuning lines sent on configure.
    pub configure_commands: Vec<String>,
}

impl Default for TcpRobotConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:10812".to_string(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 3_000,
            configure_commands: Vec::new(),
        }
    }
}

pub struct TcpRobot {
    config: TcpRobotConfig,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
    simulation_time: u64,
    last_line_at: Option<Instant>,
}

impl TcpRobot {
    pub fn new(config: TcpRobotConfig) -> Self {
        Self {
            config,
            reader: None,
            writer: None,
            simulation_time: 0,
            last_line_at: None,
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), RobotError> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            RobotError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "robot not connected",
            ))
        })?;
        debug!("robot <- {line}");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

impl RobotApi for TcpRobot {
    fn simulation_time(&self) -> u64 {
        self.simulation_time
    }

    fn is_real_time(&self) -> bool {
        true
    }

    fn connect(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async move {
            let address = self.config.address.clone();
            let stream = timeout(
                std::time::Duration::from_millis(self.config.connect_timeout_ms),
                TcpStream::connect(&address),
            )
            .await
            .map_err(|_| RobotError::Timeout(self.config.connect_timeout_ms))??;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            self.reader = Some(BufReader::new(read_half));
            self.writer = Some(write_half);
            self.last_line_at = Some(Instant::now());
            info!("connected to robot at {address}");
            Ok(())
        }
    }

    fn configure(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async move {
            for line in self.config.configure_commands.clone() {
                self.write_line(&line).await?;
            }
            Ok(())
        }
    }

    fn move_to(
        &mut self,
        direction: Complex,
        speed: i32,
    ) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async move {
            if speed.unsigned_abs() as f64 > MAX_PPS {
                return Err(RobotError::InvalidArgument(format!(
                    "speed {speed} exceeds ±{MAX_PPS} pps"
                )));
            }
            self.write_line(&format!("mv {} {}", direction.to_int_deg(), speed))
                .await
        }
    }

    fn scan(&mut self, direction: Complex) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async move {
            self.write_line(&format!("sc {}", direction.to_int_deg()))
                .await
        }
    }

    fn halt(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async move { self.write_line("ha").await }
    }

    /// Drain status lines for up to `dt_ms` of wall time. The line clock is
    /// taken from the messages themselves.
    fn tick(
        &mut self,
        dt_ms: u64,
    ) -> impl std::future::Future<Output = Result<Vec<WheellyMessage>, RobotError>> + Send {
        async move {
            let reader = self.reader.as_mut().ok_or_else(|| {
                RobotError::Transport(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "robot not connected",
                ))
            })?;
            let deadline = Instant::now() + std::time::Duration::from_millis(dt_ms);
            let mut messages = Vec::new();
            let mut line = String::new();
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                line.clear();
                match timeout(deadline - now, reader.read_line(&mut line)).await {
                    Err(_) => break,
                    Ok(Ok(0)) => {
                        return Err(RobotError::Transport(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "robot closed the connection",
                        )))
                    }
                    Ok(Ok(_)) => {
                        self.last_line_at = Some(Instant::now());
                        match parse_status_line(line.trim_end()) {
                            Ok(message) => {
                                self.simulation_time =
                                    self.simulation_time.max(message.simulation_time());
                                messages.push(message);
                            }
                            Err(e) => warn!("dropping malformed status line: {e}"),
                        }
                    }
                    Ok(Err(e)) => return Err(RobotError::Transport(e)),
                }
            }
            let silence = self
                .last_line_at
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(u64::MAX);
            if silence > self.config.read_timeout_ms {
                return Err(RobotError::Timeout(silence));
            }
            Ok(messages)
        }
    }

    fn close(&mut self) -> impl std::future::Future<Output = Result<(), RobotError>> + Send {
        async move {
            if let Some(mut writer) = self.writer.take() {
                let _ = writer.shutdown().await;
            }
            self.reader = None;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn robot_pair() -> (TcpRobot, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let mut robot = TcpRobot::new(TcpRobotConfig {
            address,
            connect_timeout_ms: 1_000,
            read_timeout_ms: 10_000,
            configure_commands: vec!["cs 500".to_string()],
        });
        let (connected, peer) = tokio::join!(robot.connect(), async {
            listener.accept().await.unwrap().0
        });
        connected.unwrap();
        (robot, peer)
    }

    async fn read_command(peer: &mut TcpStream) -> String {
        let mut buf = [0u8; 256];
        let n = peer.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    #[tokio::test]
    async fn commands_are_framed_as_lines() {
        let (mut robot, mut peer) = robot_pair().await;
        robot.configure().await.unwrap();
        assert_eq!(read_command(&mut peer).await, "cs 500\n");

        robot.move_to(Complex::from_deg(90.0), 10).await.unwrap();
        assert_eq!(read_command(&mut peer).await, "mv 90 10\n");

        robot.scan(Complex::from_deg(-45.0)).await.unwrap();
        assert_eq!(read_command(&mut peer).await, "sc -45\n");

        robot.halt().await.unwrap();
        assert_eq!(read_command(&mut peer).await, "ha\n");
    }

    #[tokio::test]
    async fn out_of_range_speed_is_rejected_locally() {
        let (mut robot, _peer) = robot_pair().await;
        let err = robot.move_to(Complex::from_deg(0.0), 500).await.unwrap_err();
        assert!(matches!(err, RobotError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn tick_parses_lines_and_drops_garbage() {
        let (mut robot, mut peer) = robot_pair().await;
        peer.write_all(b"ct 42 1 0 1 1\nnot a status line\npx 50 0 0 0 0 0\n")
            .await
            .unwrap();
        peer.flush().await.unwrap();

        let messages = robot.tick(200).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], WheellyMessage::Contacts(_)));
        assert!(matches!(messages[1], WheellyMessage::Proxy(_)));
        assert_eq!(robot.simulation_time(), 50);
    }

    #[tokio::test]
    async fn peer_disconnect_is_a_transport_error() {
        let (mut robot, peer) = robot_pair().await;
        drop(peer);
        let err = robot.tick(200).await.unwrap_err();
        assert!(matches!(err, RobotError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_tick_returns_no_messages() {
        let (mut robot, _peer) = robot_pair().await;
        let messages = robot.tick(50).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // a bound-then-dropped listener leaves a refusing port behind
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        let mut robot = TcpRobot::new(TcpRobotConfig {
            address,
            connect_timeout_ms: 500,
            read_timeout_ms: 1_000,
            configure_commands: Vec::new(),
        });
        let err = robot.connect().await.unwrap_err();
        assert!(matches!(
            err,
            RobotError::Transport(_) | RobotError::Timeout(_)
        ));
    }
}
