//! qvect.rs — Quadratic vertex vectors
//!
//! A `QVect` lifts a 2D point to the 5-vector `(1, x, y, x², y²)`, so any
//! predicate of the form `a₀ + a₁x + a₂y + a₃x² + a₄y² ≥ 0` becomes a plain
//! dot product against a coefficient vector. Half-planes and circles share
//! one evaluation path, which is what lets the area compiler precompute leaf
//! masks over a whole grid of vertices.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QVect(pub [f64; 5]);

impl QVect {
    /// Lift a point: `(1, x, y, x², y²)`.
    pub fn from(p: Point) -> Self {
        Self([1.0, p.x, p.y, p.x * p.x, p.y * p.y])
    }

    pub fn zeros() -> Self {
        Self([0.0; 5])
    }

    pub fn ones() -> Self {
        Self([1.0; 5])
    }

    /// Coefficient vector of a linear form `a₀ + a₁x + a₂y`.
    pub fn line(a0: f64, a1: f64, a2: f64) -> Self {
        Self([a0, a1, a2, 0.0, 0.0])
    }

    /// Dot product `Σ vᵢ bᵢ`.
    pub fn mmult(&self, other: &QVect) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Intersection of the two linear constraints `a₁x + a₂y + a₀ = 0` and
    /// `b₁x + b₂y + b₀ = 0`, ignoring the quadratic entries. `None` when the
    /// determinant vanishes (parallel or degenerate lines).
    pub fn intersect(&self, other: &QVect) -> Option<Point> {
        let [a0, a1, a2, ..] = self.0;
        let [b0, b1, b2, ..] = other.0;
        let det = a1 * b2 - a2 * b1;
        if det.abs() < 1e-10 {
            return None;
        }
        Some(Point::new(
            (a2 * b0 - a0 * b2) / det,
            (a0 * b1 - a1 * b0) / det,
        ))
    }
}
