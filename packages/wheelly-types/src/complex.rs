//! complex.rs — Unit direction vectors
//!
//! A heading is an immutable unit 2-vector `(x, y)` with the robot's forward
//! axis on +y, so DEG0 points north and DEG90 points east. Angles compose by
//! complex multiplication, which keeps every rotation chain exactly on the
//! unit circle (no accumulated drift from repeated degree arithmetic).
//!
//! Conventions:
//! - compass parametrization: `x = sin θ`, `y = cos θ`, θ clockwise from +y
//! - degrees normalize to (−180, 180]

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Immutable unit direction. `x² + y² = 1` for every constructed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    x: f64,
    y: f64,
}

/// North (forward).
pub const DEG0: Complex = Complex { x: 0.0, y: 1.0 };
/// East (right).
pub const DEG90: Complex = Complex { x: 1.0, y: 0.0 };
/// South (rear).
pub const DEG180: Complex = Complex { x: 0.0, y: -1.0 };
/// West (left).
pub const DEG270: Complex = Complex { x: -1.0, y: 0.0 };

impl Complex {
    /// Direction from a compass angle in degrees, normalized to (−180, 180].
    pub fn from_deg(deg: f64) -> Self {
        Self::from_rad(deg.to_radians())
    }

    /// Direction from a compass angle in radians.
    pub fn from_rad(rad: f64) -> Self {
        Self {
            x: rad.sin(),
            y: rad.cos(),
        }
    }

    /// Direction of a point seen from the origin. The zero vector maps to DEG0.
    pub fn from_point(p: Point) -> Self {
        let norm = (p.x * p.x + p.y * p.y).sqrt();
        if norm == 0.0 {
            DEG0
        } else {
            Self {
                x: p.x / norm,
                y: p.y / norm,
            }
        }
    }

    /// Direction of `to` as seen from `from`. Coincident points map to DEG0.
    pub fn direction(from: Point, to: Point) -> Self {
        Self::from_point(to.sub(from))
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Compass angle in radians, in (−π, π].
    pub fn to_rad(&self) -> f64 {
        self.x.atan2(self.y)
    }

    /// Compass angle in degrees, in (−180, 180].
    pub fn to_deg(&self) -> f64 {
        self.to_rad().to_degrees()
    }

    /// Compass angle rounded half-up to the nearest integer degree.
    pub fn to_int_deg(&self) -> i32 {
        (self.to_deg() + 0.5).floor() as i32
    }

    /// Rotation composition: the heading at `self + other` degrees.
    pub fn add(&self, other: Complex) -> Self {
        Self {
            x: self.x * other.y + self.y * other.x,
            y: self.y * other.y - self.x * other.x,
        }
    }

    /// Rotation difference: the heading at `self − other` degrees.
    pub fn sub(&self, other: Complex) -> Self {
        Self {
            x: self.x * other.y - self.y * other.x,
            y: self.y * other.y + self.x * other.x,
        }
    }

    /// Mirror about the forward axis (θ → −θ).
    pub fn neg(&self) -> Self {
        Self {
            x: -self.x,
            y: self.y,
        }
    }

    /// Half-turn rotation (θ → θ + 180°).
    pub fn opposite(&self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }

    /// Tangent of the compass angle. ±∞ at ±90°.
    pub fn tan(&self) -> f64 {
        self.x / self.y
    }

    pub fn dot(&self, other: Complex) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Cross product `self × other` (positive when `other` is clockwise of `self`).
    pub fn cross(&self, other: Complex) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// True when the angular distance to `other` is within `epsilon` radians,
    /// tested on the chord: `dot ≥ 1 − ε²/2`.
    pub fn is_close_to(&self, other: Complex, epsilon: f64) -> bool {
        self.dot(other) >= 1.0 - epsilon * epsilon / 2.0
    }

    /// Heading within the front half-plane, with `epsilon` slack on cos θ.
    pub fn is_front(&self, epsilon: f64) -> bool {
        self.y >= -epsilon
    }

    /// Heading within the rear half-plane, with `epsilon` slack on cos θ.
    pub fn is_rear(&self, epsilon: f64) -> bool {
        self.y <= epsilon
    }

    /// Heading within the right half-plane, with `epsilon` slack on sin θ.
    pub fn is_right(&self, epsilon: f64) -> bool {
        self.x >= -epsilon
    }

    /// Heading within the left half-plane, with `epsilon` slack on sin θ.
    pub fn is_left(&self, epsilon: f64) -> bool {
        self.x <= epsilon
    }

    /// The unit point of this heading at the given distance from `origin`.
    pub fn at(&self, origin: Point, distance: f64) -> Point {
        Point::new(origin.x + self.x * distance, origin.y + self.y * distance)
    }
}
