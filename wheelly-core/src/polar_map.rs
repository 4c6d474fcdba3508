//! polar_map.rs — Sector projection of the occupancy grid
//!
//! Partitions the plane around the robot into equal angular sectors and
//! records, per sector, the nearest obstacle evidence within range. Policy
//! code reads this to find free directions without re-scanning the grid.

use serde::{Deserialize, Serialize};

use wheelly_types::{Complex, Point};

use crate::radar_map::RadarMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorStatus {
    /// No evidence in the sector.
    Unknown,
    /// Known sensed space with no obstacle in range.
    Empty,
    /// An obstacle (echo or contact) within range.
    Hindered,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarSector {
    pub status: SectorStatus,
    /// Nearest obstacle cell centre, when hindered.
    pub obstacle: Option<Point>,
    /// Distance to the nearest obstacle, ∞ when none.
    pub distance: f64,
}

impl PolarSector {
    fn unknown() -> Self {
        Self {
            status: SectorStatus::Unknown,
            obstacle: None,
            distance: f64::INFINITY,
        }
    }

    pub fn is_known(&self) -> bool {
        self.status != SectorStatus::Unknown
    }

    pub fn is_hindered(&self) -> bool {
        self.status == SectorStatus::Hindered
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarMap {
    center: Point,
    direction: Complex,
    sectors: Vec<PolarSector>,
}

impl PolarMap {
    pub fn new(center: Point, direction: Complex, num_sectors: usize) -> Self {
        Self {
            center,
            direction,
            sectors: vec![PolarSector::unknown(); num_sectors],
        }
    }

    /// Rebuild from explicit sectors (codec read-back).
    pub fn from_parts(center: Point, direction: Complex, sectors: Vec<PolarSector>) -> Self {
        Self {
            center,
            direction,
            sectors,
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn direction(&self) -> Complex {
        self.direction
    }

    pub fn sectors(&self) -> &[PolarSector] {
        &self.sectors
    }

    pub fn sector(&self, index: usize) -> &PolarSector {
        &self.sectors[index]
    }

    /// Width of one sector, radians.
    pub fn sector_width(&self) -> f64 {
        std::f64::consts::TAU / self.sectors.len() as f64
    }

    /// Index of the sector whose centre is nearest to `direction`
    /// (relative to the map's forward direction).
    pub fn sector_index(&self, direction: Complex) -> usize {
        let width_deg = 360.0 / self.sectors.len() as f64;
        let rel = direction.sub(self.direction).to_deg();
        let n = self.sectors.len() as i64;
        ((rel / width_deg).round() as i64).rem_euclid(n) as usize
    }

    /// Absolute heading of a sector centre.
    pub fn sector_direction(&self, index: usize) -> Complex {
        let width_deg = 360.0 / self.sectors.len() as f64;
        self.direction.add(Complex::from_deg(index as f64 * width_deg))
    }

    /// Project a radar map around `center` looking `direction`, keeping the
    /// nearest obstacle per sector out to `max_distance`.
    pub fn from_radar(
        map: &RadarMap,
        center: Point,
        direction: Complex,
        num_sectors: usize,
        max_distance: f64,
    ) -> Self {
        let mut polar = Self::new(center, direction, num_sectors);
        for cell in map.cells() {
            if cell.is_unknown() {
                continue;
            }
            let distance = cell.location.dist(center);
            if distance > max_distance {
                continue;
            }
            let idx = polar.sector_index(Complex::direction(center, cell.location));
            let sector = &mut polar.sectors[idx];
            if cell.is_hindrance() {
                if distance < sector.distance {
                    *sector = PolarSector {
                        status: SectorStatus::Hindered,
                        obstacle: Some(cell.location),
                        distance,
                    };
                }
            } else if cell.is_empty() && sector.status == SectorStatus::Unknown {
                sector.status = SectorStatus::Empty;
            }
        }
        polar
    }
}
