//! main.rs — Simulated robot demo entry point
//!
//! Wires the full stack over the physics model:
//!   1. SimRobot produces the robot message streams
//!   2. RobotController drives connect/configure/tick and the command queue
//!   3. WorldModeller folds statuses into radar + polar + marker snapshots
//!   4. a small wander policy consumes the world models and steers
//!
//! Run with `--speed 10` to compress wall time, `--seed` to replay a world.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use wheelly_core::{
    start_world_modeller, ControllerConfig, RobotController, SectorStatus, WorldConfig,
    WorldModel, WorldModeller,
};
use wheelly_sim::{ObstacleMap, SimConfig, SimRobot};
use wheelly_types::{Complex, GridTopology, Point, RobotSpec, DEG0};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "wheelly-sim", about = "Wheelly simulated robot demo")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Wall-time compression factor (1.0 = real-time)
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// Override the world seed
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated seconds to run before shutting down
    #[arg(long, default_value = "60")]
    duration_s: u64,
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FullConfig {
    robot: RobotSpec,
    controller: ControllerConfig,
    world: WorldConfig,
    grid: GridConfig,
    sim: SimConfig,
    obstacles: ObstaclesConfig,
}

#[derive(Debug, Deserialize)]
struct GridConfig {
    width: usize,
    height: usize,
    grid_size: f64,
}

#[derive(Debug, Deserialize)]
struct ObstaclesConfig {
    random_count: usize,
    range_m: f64,
    radius_m: f64,
    clearance_m: f64,
    labeled: Vec<LabeledObstacle>,
}

#[derive(Debug, Deserialize)]
struct LabeledObstacle {
    label: String,
    x: f64,
    y: f64,
    radius: f64,
}

fn build_obstacles(cfg: &ObstaclesConfig, seed: u64) -> ObstacleMap {
    let mut map = ObstacleMap::random(
        cfg.random_count,
        seed,
        cfg.range_m,
        cfg.radius_m,
        cfg.clearance_m,
    );
    for labeled in &cfg.labeled {
        map = map.with_labeled(&labeled.label, labeled.x, labeled.y, labeled.radius);
    }
    map
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wheelly_sim=info,wheelly_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let config_str = std::fs::read_to_string(&args.config)
        .unwrap_or_else(|_| include_str!("../config.toml").to_string());
    let mut cfg: FullConfig = toml::from_str(&config_str).context("invalid config.toml")?;
    if let Some(seed) = args.seed {
        cfg.sim.seed = seed;
    }
    cfg.controller.simulation_speed = args.speed;

    let obstacles = build_obstacles(&cfg.obstacles, cfg.sim.seed);
    info!(
        "starting sim: {} obstacles, seed {}, {}x wall speed",
        obstacles.obstacles().len(),
        cfg.sim.seed,
        args.speed
    );

    let robot = SimRobot::new(cfg.robot, cfg.sim, obstacles);
    let controller = RobotController::start(robot, cfg.robot, cfg.controller);

    let topology = GridTopology::new(
        Point::zero(),
        cfg.grid.width,
        cfg.grid.height,
        cfg.grid.grid_size,
    );
    let modeller = WorldModeller::new(cfg.robot, topology, cfg.world);
    let (modeller_task, mut models) =
        start_world_modeller(modeller, controller.read_robot_status());

    // wander policy: cruise forward, turn away when the front is blocked
    let mut heading = DEG0;
    let deadline = tokio::time::Instant::now()
        + Duration::from_secs_f64(args.duration_s as f64 / args.speed.max(1e-3));

    loop {
        tokio::select! {
            model = models.recv() => {
                match model {
                    Ok(model) => heading = steer(&controller, &model, heading),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("policy lagged, skipped {n} world models");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    info!("demo complete, shutting down");
    controller.shutdown();
    controller.join_shutdown().await;
    modeller_task.abort();
    Ok(())
}

fn steer(controller: &RobotController, model: &Arc<WorldModel>, heading: Complex) -> Complex {
    let front = model.polar_map.sector(0);
    let blocked = front.status == SectorStatus::Hindered && front.distance < 0.6;
    let next = if blocked {
        heading.add(Complex::from_deg(90.0))
    } else {
        heading
    };
    if !controller.move_to(next, 20) {
        warn!("move command rejected");
    }
    if let Some(location) = model.robot_status.location() {
        info!(
            "t={} pos=({:.2}, {:.2}) markers={} safe={}",
            model.robot_status.simulation_time,
            location.x,
            location.y,
            model.markers.len(),
            model.safe_points.len()
        );
    }
    next
}
