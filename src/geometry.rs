// Planar geometry shared by the path-loss model, the solver and the metrics.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A sensor with a known, fixed position (meters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl AnchorPosition {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        AnchorPosition {
            id: id.into(),
            x,
            y,
        }
    }

    pub fn point(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Estimated device position (meters).
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub x: f64,
    pub y: f64,
}

impl PositionEstimate {
    pub fn new(x: f64, y: f64) -> Self {
        PositionEstimate { x, y }
    }

    pub fn point(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl From<(f64, f64)> for PositionEstimate {
    fn from((x, y): (f64, f64)) -> Self {
        PositionEstimate { x, y }
    }
}

pub fn euclidean_distance(p1: (f64, f64), p2: (f64, f64)) -> f64 {
    ((p1.0 - p2.0).powi(2) + (p1.1 - p2.1).powi(2)).sqrt()
}

/// Check that an anchor set can support a 2D solve.
///
/// True iff there are at least 3 points and no two share the exact same
/// coordinate pair. Equality is bitwise on the floats, no tolerance.
pub fn validate_anchor_positions(points: &[(f64, f64)]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let mut seen = HashSet::with_capacity(points.len());
    // Normalise -0.0 so it compares equal to 0.0, as `==` would
    points
        .iter()
        .all(|&(x, y)| seen.insert(((x + 0.0).to_bits(), (y + 0.0).to_bits())))
}

/// Average Euclidean distance between positionally paired points.
///
/// Pairs beyond the shorter list are ignored; matching the lengths is up to
/// the caller.
pub fn mean_error(estimates: &[(f64, f64)], ground_truth: &[(f64, f64)]) -> f64 {
    let errors: Vec<f64> = estimates
        .iter()
        .zip(ground_truth)
        .map(|(&est, &truth)| euclidean_distance(est, truth))
        .collect();

    errors.iter().sum::<f64>() / errors.len() as f64
}

/// Arithmetic mean of the points, `None` for an empty slice.
pub fn centroid(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    Some((sx / n, sy / n))
}
