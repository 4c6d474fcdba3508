//! area.rs — Symbolic area expressions
//!
//! A boolean algebra over geometric predicates: leaves are quadratic
//! inequalities `a·v ≥ 0` on lifted points, internal nodes are And/Or/Not.
//! Expressions compile once per query into a flat leaf table plus a small
//! post-order program, so the per-cell hot loop runs over boolean vectors
//! with no dynamic dispatch.
//!
//! Grid evaluation uses the any-corner projection: a leaf holds for a cell
//! when at least one of its 4 corners satisfies it, and the boolean tree is
//! applied to those per-leaf corner disjunctions. A convex predicate that
//! touches a cell always captures a corner of it, which makes the projection
//! a conservative and tight inside test for the shapes constructed here.

use serde::{Deserialize, Serialize};

use crate::complex::{Complex, DEG90};
use crate::geometry::Point;
use crate::qvect::QVect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaExpression {
    Ineq(QVect),
    And(Box<AreaExpression>, Box<AreaExpression>),
    Or(Box<AreaExpression>, Box<AreaExpression>),
    Not(Box<AreaExpression>),
}

/// Half-plane `dot(v − p, normal) ≥ 0`.
fn half_plane(p: Point, normal: Point) -> AreaExpression {
    AreaExpression::Ineq(QVect::line(-(normal.x * p.x + normal.y * p.y), normal.x, normal.y))
}

impl AreaExpression {
    pub fn not(e: AreaExpression) -> AreaExpression {
        AreaExpression::Not(Box::new(e))
    }

    pub fn and(a: AreaExpression, b: AreaExpression) -> AreaExpression {
        AreaExpression::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: AreaExpression, b: AreaExpression) -> AreaExpression {
        AreaExpression::Or(Box::new(a), Box::new(b))
    }

    /// Half-plane to the right of the ray from `p` toward `dir`.
    pub fn right_half_plane(p: Point, dir: Complex) -> AreaExpression {
        let n = dir.add(DEG90);
        half_plane(p, Point::new(n.x(), n.y()))
    }

    /// Closed disk.
    pub fn circle(center: Point, radius: f64) -> AreaExpression {
        AreaExpression::Ineq(QVect([
            radius * radius - center.x * center.x - center.y * center.y,
            2.0 * center.x,
            2.0 * center.y,
            -1.0,
            -1.0,
        ]))
    }

    /// Angular sector `dir ± half_width` (radians) centered on `apex`:
    /// the intersection of the two boundary half-planes.
    pub fn angle(apex: Point, dir: Complex, half_width: f64) -> AreaExpression {
        let low = dir.sub(Complex::from_rad(half_width));
        let high = dir.add(Complex::from_rad(half_width));
        Self::and(
            Self::right_half_plane(apex, low),
            Self::right_half_plane(apex, high.opposite()),
        )
    }

    /// Swept stripe of total `width` between `a` and `b`: four half-planes.
    pub fn rectangle(a: Point, b: Point, width: f64) -> AreaExpression {
        let d = Complex::direction(a, b);
        let dv = Point::new(d.x(), d.y());
        let n = d.add(DEG90);
        let nv = Point::new(n.x(), n.y());
        let h = width / 2.0;
        Self::and(
            Self::and(half_plane(a, dv), half_plane(b, dv.scale(-1.0))),
            Self::and(
                half_plane(a.add(nv.scale(h)), nv.scale(-1.0)),
                half_plane(a.sub(nv.scale(h)), nv),
            ),
        )
    }

    /// Candidate region of a directional range signal: the sensed disk
    /// widened by one cell, cut to the receptive cone. Cells outside this
    /// area cannot intersect the sensor cone and are skipped by the bulk
    /// modeller.
    pub fn radial_sensor_area(
        location: Point,
        direction: Complex,
        distance: f64,
        max_distance: f64,
        receptive_angle: f64,
        grid_size: f64,
    ) -> AreaExpression {
        let range = if distance > 0.0 {
            distance.min(max_distance)
        } else {
            max_distance
        };
        Self::and(
            Self::circle(location, range + grid_size),
            Self::angle(location, direction, receptive_angle),
        )
    }

    /// Compile into the flat leaf table + post-order program.
    pub fn compile(&self) -> CompiledArea {
        let mut leaves: Vec<QVect> = Vec::new();
        let mut ops: Vec<Op> = Vec::new();
        fn walk(e: &AreaExpression, leaves: &mut Vec<QVect>, ops: &mut Vec<Op>) -> usize {
            match e {
                AreaExpression::Ineq(q) => {
                    let leaf = leaves
                        .iter()
                        .position(|l| l == q)
                        .unwrap_or_else(|| {
                            leaves.push(*q);
                            leaves.len() - 1
                        });
                    ops.push(Op::Leaf(leaf));
                }
                AreaExpression::And(a, b) => {
                    let ia = walk(a, leaves, ops);
                    let ib = walk(b, leaves, ops);
                    ops.push(Op::And(ia, ib));
                }
                AreaExpression::Or(a, b) => {
                    let ia = walk(a, leaves, ops);
                    let ib = walk(b, leaves, ops);
                    ops.push(Op::Or(ia, ib));
                }
                AreaExpression::Not(a) => {
                    let ia = walk(a, leaves, ops);
                    ops.push(Op::Not(ia));
                }
            }
            ops.len() - 1
        }
        walk(self, &mut leaves, &mut ops);
        CompiledArea { leaves, ops }
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Leaf(usize),
    And(usize, usize),
    Or(usize, usize),
    Not(usize),
}

/// A compiled expression: leaf coefficient table plus a post-order boolean
/// program whose last op is the root.
#[derive(Debug, Clone)]
pub struct CompiledArea {
    leaves: Vec<QVect>,
    ops: Vec<Op>,
}

impl CompiledArea {
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Evaluate the tree over per-leaf truth values.
    pub fn eval(&self, leaf_values: &[bool]) -> bool {
        let mut vals = vec![false; self.ops.len()];
        for (i, op) in self.ops.iter().enumerate() {
            vals[i] = match *op {
                Op::Leaf(l) => leaf_values[l],
                Op::And(a, b) => vals[a] && vals[b],
                Op::Or(a, b) => vals[a] || vals[b],
                Op::Not(a) => !vals[a],
            };
        }
        *vals.last().unwrap_or(&false)
    }

    /// Pointwise membership of a lifted point.
    pub fn contains(&self, v: &QVect) -> bool {
        let leaf_values: Vec<bool> = self.leaves.iter().map(|l| l.mmult(v) >= 0.0).collect();
        self.eval(&leaf_values)
    }

    /// Per-vertex leaf masks: `mask[leaf][vertex]`.
    pub fn vertex_masks(&self, vertices: &[QVect]) -> Vec<Vec<bool>> {
        self.leaves
            .iter()
            .map(|l| vertices.iter().map(|v| l.mmult(v) >= 0.0).collect())
            .collect()
    }

    /// The any-corner cell predicate over a grid: per leaf, OR across the
    /// cell's 4 corner masks, then the boolean program.
    pub fn filter_by_area(
        &self,
        vertices: &[QVect],
        vertices_by_cell: &[[usize; 4]],
    ) -> Vec<bool> {
        let masks = self.vertex_masks(vertices);
        let mut leaf_values = vec![false; self.leaves.len()];
        vertices_by_cell
            .iter()
            .map(|corners| {
                for (value, mask) in leaf_values.iter_mut().zip(masks.iter()) {
                    *value = corners.iter().any(|&c| mask[c]);
                }
                self.eval(&leaf_values)
            })
            .collect()
    }
}

/// Convenience one-shot operator: compile and filter in one call.
pub fn filter_by_area(
    e: &AreaExpression,
    vertices: &[QVect],
    vertices_by_cell: &[[usize; 4]],
) -> Vec<bool> {
    e.compile().filter_by_area(vertices, vertices_by_cell)
}
