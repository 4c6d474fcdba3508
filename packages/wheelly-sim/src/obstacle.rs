//! obstacle.rs — Disk obstacle map
//!
//! The simulated world is a flat plane with circular obstacles, optionally
//! carrying a fiducial label for the camera model. Placement is
//! seed-parametric so every run is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use wheelly_types::{Complex, Point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Fiducial label, when the obstacle carries one.
    pub label: Option<String>,
    pub center: Point,
    pub radius: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObstacleMap {
    obstacles: Vec<Obstacle>,
}

impl ObstacleMap {
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn with_disk(mut self, x: f64, y: f64, radius: f64) -> Self {
        self.obstacles.push(Obstacle {
            label: None,
            center: Point::new(x, y),
            radius,
        });
        self
    }

    pub fn with_labeled(mut self, label: &str, x: f64, y: f64, radius: f64) -> Self {
        self.obstacles.push(Obstacle {
            label: Some(label.to_string()),
            center: Point::new(x, y),
            radius,
        });
        self
    }

    /// Scatter `count` unlabeled disks uniformly in a square of half-side
    /// `range`, keeping a hole of `clearance` around the origin. Same seed,
    /// same map.
    pub fn random(count: usize, seed: u64, range: f64, radius: f64, clearance: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut obstacles = Vec::with_capacity(count);
        while obstacles.len() < count {
            let center = Point::new(rng.gen_range(-range..range), rng.gen_range(-range..range));
            if center.norm() < clearance + radius {
                continue;
            }
            obstacles.push(Obstacle {
                label: None,
                center,
                radius,
            });
        }
        Self { obstacles }
    }

    /// The obstacle overlapping a circle at `center` of `radius`, if any.
    pub fn collision(&self, center: Point, radius: f64) -> Option<&Obstacle> {
        self.obstacles
            .iter()
            .find(|o| o.center.dist(center) < o.radius + radius)
    }

    /// Nearest obstacle surface inside the cone `direction ± half_width`
    /// from `origin`, with its distance. Obstacles are seen when the cone
    /// overlaps the angular span the disk subtends.
    pub fn nearest_in_cone(
        &self,
        origin: Point,
        direction: Complex,
        half_width: f64,
        max_distance: f64,
    ) -> Option<(&Obstacle, f64)> {
        self.nearest_matching(|_| true, origin, direction, half_width, max_distance)
    }

    /// Same raycast restricted to labeled obstacles (camera model).
    pub fn nearest_labeled_in_cone(
        &self,
        origin: Point,
        direction: Complex,
        half_width: f64,
        max_distance: f64,
    ) -> Option<(&Obstacle, f64)> {
        self.nearest_matching(
            |o| o.label.is_some(),
            origin,
            direction,
            half_width,
            max_distance,
        )
    }

    fn nearest_matching(
        &self,
        keep: impl Fn(&Obstacle) -> bool,
        origin: Point,
        direction: Complex,
        half_width: f64,
        max_distance: f64,
    ) -> Option<(&Obstacle, f64)> {
        let mut best: Option<(&Obstacle, f64)> = None;
        for obstacle in self.obstacles.iter().filter(|o| keep(o)) {
            let center_distance = origin.dist(obstacle.center);
            let surface = (center_distance - obstacle.radius).max(0.0);
            if surface > max_distance {
                continue;
            }
            let subtended = if center_distance > obstacle.radius {
                (obstacle.radius / center_distance).asin()
            } else {
                std::f64::consts::FRAC_PI_2
            };
            let to_center = Complex::direction(origin, obstacle.center);
            let off_axis = to_center.dot(direction).clamp(-1.0, 1.0).acos();
            if off_axis > half_width + subtended {
                continue;
            }
            if best.map_or(true, |(_, d)| surface < d) {
                best = Some((obstacle, surface));
            }
        }
        best
    }
}
