//! End-to-end: the controller drives the simulated robot, the world
//! modeller folds the resulting status stream, and the snapshots survive
//! the data-file codec.

use wheelly_core::codec::{read_world_model, write_world_model, DataFileReader, DataFileWriter};
use wheelly_core::{
    start_world_modeller, ControllerConfig, RobotController, WorldConfig, WorldModeller,
};
use wheelly_sim::{ObstacleMap, SimConfig, SimRobot};
use wheelly_types::{Complex, GridTopology, Point, RobotSpec, DEG0};

fn sim(obstacles: ObstacleMap) -> SimRobot {
    SimRobot::new(RobotSpec::DEFAULT, SimConfig::default(), obstacles)
}

fn topology() -> GridTopology {
    GridTopology::new(Point::zero(), 31, 31, 0.2)
}

async fn wait_connected(controller: &RobotController) {
    let mut rx = controller.read_controller_status();
    while !rx.borrow().is_connected() {
        rx.changed().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn controller_over_sim_builds_a_world_model() {
    let obstacles = ObstacleMap::empty().with_labeled("A", 0.0, 1.0, 0.15);
    let controller = RobotController::start(
        sim(obstacles),
        RobotSpec::DEFAULT,
        ControllerConfig::default(),
    );
    let modeller = WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
    let (task, mut models) = start_world_modeller(modeller, controller.read_robot_status());

    let model = loop {
        let model = models.recv().await.unwrap();
        if model.robot_status.simulation_time >= 2_000 {
            break model;
        }
    };

    // the labeled obstacle surface sits at 0.85 m: its cell turns echogenic
    let cell = model.radar_map.cell_at(Point::new(0.0, 0.8)).unwrap();
    assert!(cell.is_echogenic());
    // the beam up to the echo is known empty
    assert!(model.radar_map.cell_at(Point::new(0.0, 0.4)).unwrap().is_anechoic());
    // the polar projection flags the front sector
    assert!(model.polar_map.sector(0).is_hindered());
    // the camera+proxy correlation produced the labeled marker
    assert!(model.markers.contains_key("A"), "markers: {:?}", model.markers);
    let marker = &model.markers["A"];
    assert!((marker.location.y - 1.0).abs() < 0.05);

    controller.shutdown();
    controller.join_shutdown().await;
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn move_commands_drive_the_simulated_robot() {
    let controller = RobotController::start(
        sim(ObstacleMap::empty()),
        RobotSpec::DEFAULT,
        ControllerConfig::default(),
    );
    wait_connected(&controller).await;
    assert!(controller.move_to(DEG0, 30));

    let mut statuses = controller.read_robot_status();
    let status = loop {
        let status = statuses.recv().await.unwrap();
        if status.simulation_time >= 3_000 {
            break status;
        }
    };
    let location = status.location().unwrap();
    assert!(location.y > 0.2, "robot did not advance: {location:?}");
    assert!(location.x.abs() < 1e-6);

    controller.shutdown();
    controller.join_shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scan_commands_steer_the_sensor_head() {
    let controller = RobotController::start(
        sim(ObstacleMap::empty()),
        RobotSpec::DEFAULT,
        ControllerConfig::default(),
    );
    wait_connected(&controller).await;
    assert!(controller.scan(Complex::from_deg(60.0)));

    let mut proxies = controller.read_proxy();
    let mut head = 0;
    for _ in 0..6 {
        head = proxies.recv().await.unwrap().sensor_direction_deg;
        if head == 60 {
            break;
        }
    }
    assert_eq!(head, 60);

    controller.shutdown();
    controller.join_shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn world_model_survives_the_codec() {
    let obstacles = ObstacleMap::empty().with_labeled("A", 0.0, 1.0, 0.15);
    let controller = RobotController::start(
        sim(obstacles),
        RobotSpec::DEFAULT,
        ControllerConfig::default(),
    );
    let modeller = WorldModeller::new(RobotSpec::DEFAULT, topology(), WorldConfig::default());
    let (task, mut models) = start_world_modeller(modeller, controller.read_robot_status());
    let model = loop {
        let model = models.recv().await.unwrap();
        if model.robot_status.simulation_time >= 2_000 {
            break model;
        }
    };
    controller.shutdown();
    controller.join_shutdown().await;
    task.abort();

    let mut writer = DataFileWriter::new();
    write_world_model(&mut writer, &model);
    let total = writer.len();
    let mut reader = DataFileReader::new(writer.into_bytes());
    let back = read_world_model(&mut reader).unwrap();

    assert_eq!(reader.size(), total);
    assert_eq!(back.spec, model.spec);
    assert_eq!(back.robot_status, model.robot_status);
    assert_eq!(back.radar_map, model.radar_map);
    assert_eq!(back.grid_map, model.grid_map);
    assert_eq!(back.markers, model.markers);
    assert_eq!(back.safe_points, model.safe_points);
    assert_eq!(back.polar_map.center(), model.polar_map.center());
    assert_eq!(back.polar_map.sectors().len(), model.polar_map.sectors().len());
    assert!(back
        .polar_map
        .direction()
        .is_close_to(model.polar_map.direction(), 1e-9));
}
