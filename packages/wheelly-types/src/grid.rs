//! grid.rs — Fixed rectangular cell grid
//!
//! `GridTopology` is the immutable shape every map shares: a `width × height`
//! grid of square cells of `grid_size` meters, centered on a world point,
//! laid out row-major with the row index increasing northward. It also
//! derives the `(width+1)·(height+1)` corner vertices as QVects plus the
//! 4 corner indices per cell, which is what the area compiler masks over.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::qvect::QVect;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridTopology {
    center: Point,
    width: usize,
    height: usize,
    grid_size: f64,
}

impl GridTopology {
    pub fn new(center: Point, width: usize, height: usize, grid_size: f64) -> Self {
        Self {
            center,
            width,
            height,
            grid_size,
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    /// Total number of cells.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Same shape re-centered on another world point.
    pub fn centered_on(&self, center: Point) -> Self {
        Self { center, ..*self }
    }

    /// Row-major index of cell `(col, row)`, `None` outside the grid.
    pub fn index_of(&self, col: i64, row: i64) -> Option<usize> {
        if col < 0 || col >= self.width as i64 || row < 0 || row >= self.height as i64 {
            None
        } else {
            Some(row as usize * self.width + col as usize)
        }
    }

    /// `(col, row)` of a cell index.
    pub fn cell_of(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    /// World point of a cell centre.
    pub fn location(&self, index: usize) -> Point {
        let (col, row) = self.cell_of(index);
        Point::new(
            self.center.x + (col as f64 - (self.width as f64 - 1.0) / 2.0) * self.grid_size,
            self.center.y + (row as f64 - (self.height as f64 - 1.0) / 2.0) * self.grid_size,
        )
    }

    /// Continuous cell coordinates: cell `(c, r)` covers `[c, c+1) × [r, r+1)`.
    pub fn to_cell_coords(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.center.x) / self.grid_size + self.width as f64 / 2.0,
            (p.y - self.center.y) / self.grid_size + self.height as f64 / 2.0,
        )
    }

    /// Cell index containing a world point, `None` outside the grid.
    pub fn index_at(&self, p: Point) -> Option<usize> {
        let u = self.to_cell_coords(p);
        self.index_of(u.x.floor() as i64, u.y.floor() as i64)
    }

    /// World point of grid corner `(col, row)`, `col ∈ 0..=width`.
    pub fn vertex_location(&self, col: usize, row: usize) -> Point {
        Point::new(
            self.center.x + (col as f64 - self.width as f64 / 2.0) * self.grid_size,
            self.center.y + (row as f64 - self.height as f64 / 2.0) * self.grid_size,
        )
    }

    /// All grid corners lifted to QVects, row-major over `(width+1)·(height+1)`.
    pub fn vertices(&self) -> Vec<QVect> {
        let mut out = Vec::with_capacity((self.width + 1) * (self.height + 1));
        for row in 0..=self.height {
            for col in 0..=self.width {
                out.push(QVect::from(self.vertex_location(col, row)));
            }
        }
        out
    }

    /// The 4 corner vertex indices of every cell, in cell order.
    pub fn vertices_by_cell(&self) -> Vec<[usize; 4]> {
        let stride = self.width + 1;
        (0..self.area())
            .map(|idx| {
                let (col, row) = self.cell_of(idx);
                let sw = row * stride + col;
                [sw, sw + 1, sw + stride, sw + stride + 1]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_grid_centers_middle_cell_on_origin() {
        let t = GridTopology::new(Point::zero(), 11, 11, 0.2);
        let mid = t.index_at(Point::zero()).unwrap();
        assert_eq!(mid, 5 * 11 + 5);
        let p = t.location(mid);
        assert!(p.x.abs() < 1e-12 && p.y.abs() < 1e-12);
    }

    #[test]
    fn rows_increase_northward() {
        let t = GridTopology::new(Point::zero(), 11, 11, 0.2);
        let north = t.index_at(Point::new(0.0, 0.8)).unwrap();
        assert_eq!(north, 9 * 11 + 5);
        assert!(t.location(north).y > t.location(5 * 11 + 5).y);
    }

    #[test]
    fn out_of_grid_points_have_no_index() {
        let t = GridTopology::new(Point::zero(), 11, 11, 0.2);
        assert!(t.index_at(Point::new(0.0, 1.2)).is_none());
        assert!(t.index_at(Point::new(-1.2, 0.0)).is_none());
        // the span is ±1.1 m; the edge cell is still inside
        assert!(t.index_at(Point::new(0.0, 1.05)).is_some());
    }

    #[test]
    fn vertices_bound_their_cells() {
        let t = GridTopology::new(Point::new(1.0, -1.0), 4, 3, 0.5);
        let by_cell = t.vertices_by_cell();
        assert_eq!(by_cell.len(), 12);
        // cell 0 corners: the grid's south-west square
        assert_eq!(by_cell[0], [0, 1, 5, 6]);
        let vs = t.vertices();
        assert_eq!(vs.len(), 5 * 4);
        // south-west corner of cell 0 sits half a grid west/south of its centre
        let c0 = t.location(0);
        let sw = t.vertex_location(0, 0);
        assert!((c0.x - sw.x - 0.25).abs() < 1e-12);
        assert!((c0.y - sw.y - 0.25).abs() < 1e-12);
    }

    #[test]
    fn index_round_trip() {
        let t = GridTopology::new(Point::new(-0.4, 0.7), 7, 9, 0.3);
        for idx in 0..t.area() {
            assert_eq!(t.index_at(t.location(idx)), Some(idx));
        }
    }
}
