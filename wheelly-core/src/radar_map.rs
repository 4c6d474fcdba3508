//! radar_map.rs — Occupancy grid with directional range updates
//!
//! The map is an immutable snapshot: every update clones the cell array and
//! returns a new map, so readers can hold a `RadarMap` across awaits without
//! locking. The grid corners are lifted to QVects once at construction and
//! shared between snapshots.
//!
//! Per-signal update: a `radial_sensor_area` expression narrows the grid to
//! candidate cells (leaf masks over the shared vertices), then each candidate
//! runs the exact cone-vs-cell-square test:
//!
//! 1. no intersection → unchanged
//! 2. near = 0 (cell holds the sensor), near beyond max range, or near
//!    hidden behind the echo → unchanged
//! 3. echo inside [near, far] → echogenic evidence
//! 4. otherwise the cone swept the cell without a return → anechoic evidence

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use wheelly_types::{
    filter_by_area, segment, sector_square, AreaExpression, Complex, GridTopology, Point, QVect,
    RobotSpec,
};

use crate::map_cell::MapCell;

// ── Signal & configuration ────────────────────────────────────────────────────

/// One directional range sample. `distance = 0` means no echo in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSignal {
    pub location: Point,
    pub direction: Complex,
    pub distance: f64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadarConfig {
    /// Evidence decay time constant, ms.
    pub decay_ms: f64,
    /// Echo evidence older than this is erased on clean, ms.
    pub echo_persistence_ms: u64,
    /// Contact evidence older than this is erased on clean, ms.
    pub contact_persistence_ms: u64,
    /// Label evidence older than this is erased on clean, ms.
    pub labeled_persistence_ms: u64,
    /// Minimum spacing between clean passes, ms.
    pub clean_interval_ms: u64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            decay_ms: 120_000.0,
            echo_persistence_ms: 300_000,
            contact_persistence_ms: 600_000,
            labeled_persistence_ms: 300_000,
            clean_interval_ms: 30_000,
        }
    }
}

// ── Radar map ─────────────────────────────────────────────────────────────────

/// Persistence goes through the data-file codec, which rebuilds the shared
/// vertex tables from the topology on read-back.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarMap {
    topology: GridTopology,
    cells: Vec<MapCell>,
    vertices: Arc<Vec<QVect>>,
    vertices_by_cell: Arc<Vec<[usize; 4]>>,
    clean_timestamp: u64,
}

impl RadarMap {
    pub fn new(topology: GridTopology) -> Self {
        let cells = (0..topology.area())
            .map(|idx| MapCell::unknown(topology.location(idx)))
            .collect();
        Self {
            topology,
            cells,
            vertices: Arc::new(topology.vertices()),
            vertices_by_cell: Arc::new(topology.vertices_by_cell()),
            clean_timestamp: 0,
        }
    }

    /// Rebuild with an explicit cell array (codec read-back).
    pub fn with_cells(topology: GridTopology, cells: Vec<MapCell>, clean_timestamp: u64) -> Self {
        Self {
            clean_timestamp,
            cells,
            ..Self::new(topology)
        }
    }

    pub fn topology(&self) -> &GridTopology {
        &self.topology
    }

    pub fn cells(&self) -> &[MapCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> &MapCell {
        &self.cells[index]
    }

    pub fn cell_at(&self, p: Point) -> Option<&MapCell> {
        self.topology.index_at(p).map(|idx| &self.cells[idx])
    }

    pub fn clean_timestamp(&self) -> u64 {
        self.clean_timestamp
    }

    fn with_new_cells(&self, cells: Vec<MapCell>) -> Self {
        Self {
            topology: self.topology,
            cells,
            vertices: self.vertices.clone(),
            vertices_by_cell: self.vertices_by_cell.clone(),
            clean_timestamp: self.clean_timestamp,
        }
    }

    /// Apply one directional range signal (the cone rule above).
    /// Non-finite signals leave the map unchanged.
    pub fn update(&self, signal: &SensorSignal, spec: &RobotSpec, config: &RadarConfig) -> Self {
        if !signal.distance.is_finite()
            || !signal.location.x.is_finite()
            || !signal.location.y.is_finite()
        {
            return self.clone();
        }
        let rho = spec.receptive_angle();
        let area = AreaExpression::radial_sensor_area(
            signal.location,
            signal.direction,
            signal.distance,
            spec.max_radar_distance,
            rho,
            self.topology.grid_size(),
        );
        let mask = filter_by_area(&area, &self.vertices, &self.vertices_by_cell);
        let is_echo = signal.distance > 0.0;

        let mut cells = self.cells.clone();
        let mut touched = 0usize;
        for (idx, cell) in cells.iter_mut().enumerate() {
            if !mask[idx] {
                continue;
            }
            let Some((near, far)) = sector_square(
                signal.location,
                signal.direction,
                rho,
                cell.location,
                self.topology.grid_size(),
            ) else {
                continue;
            };
            let near_d = near.dist(signal.location);
            let far_d = far.dist(signal.location);
            if near_d == 0.0
                || near_d > spec.max_radar_distance
                || (is_echo && near_d > signal.distance)
            {
                continue;
            }
            *cell = if is_echo && far_d >= signal.distance {
                cell.add_echogenic(signal.timestamp, config.decay_ms)
            } else {
                cell.add_anechoic(signal.timestamp, config.decay_ms)
            };
            touched += 1;
        }
        debug!("radar update: {touched} cells touched at t={}", signal.timestamp);
        self.with_new_cells(cells)
    }

    /// Point update for signals with a known echo location: the cells the
    /// beam crosses become anechoic and the terminal cell echogenic. The
    /// cell holding the sensor is skipped; a no-echo signal is ignored.
    pub fn update_point(&self, signal: &SensorSignal, config: &RadarConfig) -> Self {
        if !(signal.distance > 0.0) || !signal.distance.is_finite() {
            return self.clone();
        }
        let echo_point = signal.direction.at(signal.location, signal.distance);
        let path = segment(&self.topology, signal.location, echo_point);
        let sensor_cell = self.topology.index_at(signal.location);
        let echo_cell = self.topology.index_at(echo_point);

        let mut cells = self.cells.clone();
        for idx in path {
            if Some(idx) == sensor_cell {
                continue;
            }
            cells[idx] = if Some(idx) == echo_cell {
                cells[idx].add_echogenic(signal.timestamp, config.decay_ms)
            } else {
                cells[idx].add_anechoic(signal.timestamp, config.decay_ms)
            };
        }
        self.with_new_cells(cells)
    }

    /// Record a physical contact around a point.
    pub fn set_contact(&self, point: Point, radius: f64, timestamp: u64) -> Self {
        let mut cells = self.cells.clone();
        for cell in cells.iter_mut() {
            if cell.location.dist(point) <= radius {
                *cell = cell.with_contact(timestamp);
            }
        }
        self.with_new_cells(cells)
    }

    /// Erase expired evidence, at most once per clean interval.
    pub fn clean(&self, now: u64, config: &RadarConfig) -> Self {
        if now < self.clean_timestamp + config.clean_interval_ms {
            return self.clone();
        }
        let echo_deadline = now.saturating_sub(config.echo_persistence_ms);
        let contact_deadline = now.saturating_sub(config.contact_persistence_ms);
        let labeled_deadline = now.saturating_sub(config.labeled_persistence_ms);
        let cells = self
            .cells
            .iter()
            .map(|c| c.clean(echo_deadline, contact_deadline, labeled_deadline))
            .collect();
        let mut map = self.with_new_cells(cells);
        map.clean_timestamp = now;
        map
    }

    /// The same map re-centered on another point, snapped to the cell grid.
    /// Cells falling outside the source extent come back unknown.
    pub fn recentered(&self, center: Point) -> Self {
        let gs = self.topology.grid_size();
        let off_c = ((center.x - self.topology.center().x) / gs).round() as i64;
        let off_r = ((center.y - self.topology.center().y) / gs).round() as i64;
        let new_center = Point::new(
            self.topology.center().x + off_c as f64 * gs,
            self.topology.center().y + off_r as f64 * gs,
        );
        let topology = self.topology.centered_on(new_center);
        let cells = (0..topology.area())
            .map(|idx| {
                let (col, row) = topology.cell_of(idx);
                self.topology
                    .index_of(col as i64 + off_c, row as i64 + off_r)
                    .map(|src| self.cells[src])
                    .unwrap_or_else(|| MapCell::unknown(topology.location(idx)))
            })
            .collect();
        Self {
            topology,
            cells,
            vertices: Arc::new(topology.vertices()),
            vertices_by_cell: Arc::new(topology.vertices_by_cell()),
            clean_timestamp: self.clean_timestamp,
        }
    }
}
