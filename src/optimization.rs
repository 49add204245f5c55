use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use nalgebra::{DMatrix, Vector2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{LocError, Result};
use crate::geometry::{
    centroid, euclidean_distance, validate_anchor_positions, AnchorPosition, PositionEstimate,
};

const GAUSS_NEWTON_MAX_ITERATIONS: usize = 100;
const GAUSS_NEWTON_STEP_TOLERANCE: f64 = 1e-9;
const GAUSS_NEWTON_MAX_HALVINGS: usize = 40;
const NELDER_MEAD_MAX_ITERATIONS: u64 = 500;

/// Numerical method used to minimise the multilateration cost.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverMethod {
    #[default]
    GaussNewton,
    NelderMead,
}

/// Sum of squared differences between the geometric and measured distances.
fn multilateration_cost(anchors: &[(f64, f64)], point: (f64, f64), distances: &[f64]) -> f64 {
    anchors
        .iter()
        .zip(distances)
        .map(|(&anchor, &distance)| (euclidean_distance(point, anchor) - distance).powi(2))
        .sum()
}

fn gauss_newton(anchors: &[(f64, f64)], distances: &[f64], start: (f64, f64)) -> (f64, f64) {
    let mut guess = Vector2::new(start.0, start.1);
    let mut cost = multilateration_cost(anchors, start, distances);

    for iteration in 0..GAUSS_NEWTON_MAX_ITERATIONS {
        // Compute the Jacobian matrix and the residuals
        let mut jacobian = DMatrix::zeros(anchors.len(), 2);
        let mut residuals = DMatrix::zeros(anchors.len(), 1);

        for (i, (&(ax, ay), &distance)) in anchors.iter().zip(distances).enumerate() {
            let diff = Vector2::new(ax, ay) - guess;
            let dist = diff.norm();

            // Sitting on an anchor, keep the row finite
            let scale = dist.max(1e-6);
            jacobian[(i, 0)] = diff.x / scale;
            jacobian[(i, 1)] = diff.y / scale;

            residuals[(i, 0)] = dist - distance;
        }

        // The rows above are the negated Jacobian, hence the `+`
        let delta = match jacobian.pseudo_inverse(1e-9) {
            Ok(pinv) => pinv * &residuals,
            Err(e) => {
                debug!("Gauss-Newton pseudo-inverse failed: {}", e);
                break;
            }
        };
        let mut step = Vector2::new(delta[(0, 0)], delta[(1, 0)]);

        // Backtrack until the cost decreases; full steps overshoot on large residuals
        let mut accepted = None;
        for _ in 0..GAUSS_NEWTON_MAX_HALVINGS {
            let candidate = guess + step;
            let candidate_cost =
                multilateration_cost(anchors, (candidate.x, candidate.y), distances);
            if candidate_cost < cost {
                accepted = Some((candidate, candidate_cost));
                break;
            }
            step /= 2.0;
        }

        let Some((candidate, candidate_cost)) = accepted else {
            debug!(
                "Gauss-Newton converged after {} iterations, no descent left",
                iteration
            );
            return (guess.x, guess.y);
        };
        guess = candidate;
        cost = candidate_cost;

        trace!(
            "Gauss-Newton iteration {}: ({:.4}, {:.4}), cost {:.6}",
            iteration,
            guess.x,
            guess.y,
            cost
        );

        if step.norm() < GAUSS_NEWTON_STEP_TOLERANCE {
            debug!("Gauss-Newton converged after {} iterations", iteration + 1);
            return (guess.x, guess.y);
        }
    }

    debug!(
        "Gauss-Newton did not converge in {} iterations, returning last iterate",
        GAUSS_NEWTON_MAX_ITERATIONS
    );
    (guess.x, guess.y)
}

struct MultilaterationCost {
    anchors: Vec<(f64, f64)>,
    distances: Vec<f64>,
}

impl CostFunction for MultilaterationCost {
    type Param = Vec<f64>; // [x, y]
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        Ok(multilateration_cost(&self.anchors, (p[0], p[1]), &self.distances))
    }
}

fn nelder_mead(
    anchors: &[(f64, f64)],
    distances: &[f64],
    start: (f64, f64),
) -> Result<(f64, f64)> {
    // Size the initial simplex to the anchor layout
    let (min_x, max_x, min_y, max_y) = anchors.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(lx, hx, ly, hy), &(x, y)| (lx.min(x), hx.max(x), ly.min(y), hy.max(y)),
    );
    let step = (0.1 * (max_x - min_x).max(max_y - min_y)).max(1e-3);

    let cost = MultilaterationCost {
        anchors: anchors.to_vec(),
        distances: distances.to_vec(),
    };
    let solver = NelderMead::new(vec![
        vec![start.0, start.1],
        vec![start.0 + step, start.1],
        vec![start.0, start.1 + step],
    ]);

    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(NELDER_MEAD_MAX_ITERATIONS))
        .run()
        .map_err(|e| LocError::Solver(e.to_string()))?;

    debug!(
        "Nelder-Mead stopped after {} iterations: {:?}",
        res.state().get_iter(),
        res.state().get_termination_status()
    );

    let best = res
        .state()
        .get_best_param()
        .ok_or_else(|| LocError::Solver("no solution found".into()))?;

    Ok((best[0], best[1]))
}

/// Multilateration engine over a fixed, validated anchor set.
#[derive(Debug, Clone)]
pub struct PositionSolver {
    anchors: Vec<AnchorPosition>,
    points: Vec<(f64, f64)>,
    method: SolverMethod,
}

impl PositionSolver {
    /// Build a solver, rejecting fewer than 3 anchors or duplicate coordinates.
    pub fn new(anchors: Vec<AnchorPosition>) -> Result<Self> {
        let points: Vec<(f64, f64)> = anchors.iter().map(AnchorPosition::point).collect();

        if !validate_anchor_positions(&points) {
            return Err(LocError::Configuration(format!(
                "need at least 3 anchors with distinct coordinates, got {:?}",
                points
            )));
        }

        Ok(PositionSolver {
            anchors,
            points,
            method: SolverMethod::default(),
        })
    }

    pub fn with_method(mut self, method: SolverMethod) -> Self {
        self.method = method;
        self
    }

    pub fn anchors(&self) -> &[AnchorPosition] {
        &self.anchors
    }

    pub fn method(&self) -> SolverMethod {
        self.method
    }

    /// Cost minimised by [`PositionSolver::estimate_position`] at `point`.
    pub fn objective(&self, point: (f64, f64), distances: &[f64]) -> f64 {
        multilateration_cost(&self.points, point, distances)
    }

    /// Try localize a point with the given distances to the anchors
    ///
    /// `distances[i]` belongs to the i-th anchor given at construction. The
    /// search starts at the anchor centroid. Running out of iterations is not
    /// an error: the last iterate is returned. Non-finite distances are
    /// rejected.
    pub fn estimate_position(&self, distances: &[f64]) -> Result<PositionEstimate> {
        if distances.len() != self.points.len() {
            return Err(LocError::Argument(format!(
                "number of distances ({}) must match number of anchors ({})",
                distances.len(),
                self.points.len()
            )));
        }

        if let Some(bad) = distances.iter().find(|d| !d.is_finite()) {
            return Err(LocError::Argument(format!(
                "distances must be finite, got {bad}"
            )));
        }

        // Construction guarantees at least 3 points
        let start = centroid(&self.points).unwrap_or_default();

        let point = match self.method {
            SolverMethod::GaussNewton => gauss_newton(&self.points, distances, start),
            SolverMethod::NelderMead => nelder_mead(&self.points, distances, start)?,
        };

        debug!(
            "Estimated ({:.3}, {:.3}) with {:?}, cost {:.6}",
            point.0,
            point.1,
            self.method,
            self.objective(point, distances)
        );

        Ok(point.into())
    }

    pub fn estimate_multiple_positions(
        &self,
        distance_lists: &[Vec<f64>],
    ) -> Result<Vec<PositionEstimate>> {
        distance_lists
            .iter()
            .map(|distances| self.estimate_position(distances))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<AnchorPosition> {
        vec![
            AnchorPosition::new("a", 0.0, 0.0),
            AnchorPosition::new("b", 10.0, 0.0),
            AnchorPosition::new("c", 0.0, 10.0),
        ]
    }

    fn distances_to(point: (f64, f64), anchors: &[AnchorPosition]) -> Vec<f64> {
        anchors
            .iter()
            .map(|a| euclidean_distance(point, a.point()))
            .collect()
    }

    #[test]
    fn test_exact_solve() {
        for method in [SolverMethod::GaussNewton, SolverMethod::NelderMead] {
            let solver = PositionSolver::new(triangle()).unwrap().with_method(method);

            let solution = solver.estimate_position(&[5.0, 8.0623, 6.7082]).unwrap();

            assert!(
                euclidean_distance(solution.point(), (3.0, 4.0)) < 1e-2,
                "{:?} gave {:?}",
                method,
                solution
            );
        }
    }

    #[test]
    fn test_overdetermined_solve() {
        let anchors = vec![
            AnchorPosition::new("a", 0.0, 0.0),
            AnchorPosition::new("b", 8.0, 0.0),
            AnchorPosition::new("c", 8.0, 6.0),
            AnchorPosition::new("d", 0.0, 6.0),
            AnchorPosition::new("e", 4.0, 9.0),
        ];
        let truth = (5.5, 1.25);
        let distances = distances_to(truth, &anchors);

        for method in [SolverMethod::GaussNewton, SolverMethod::NelderMead] {
            let solver = PositionSolver::new(anchors.clone())
                .unwrap()
                .with_method(method);
            let solution = solver.estimate_position(&distances).unwrap();

            assert!(euclidean_distance(solution.point(), truth) < 1e-3);
            assert!(solver.objective(solution.point(), &distances) < 1e-6);
        }
    }

    #[test]
    fn test_solve_at_centroid() {
        // True point is the starting point itself
        let solver = PositionSolver::new(triangle()).unwrap();
        let truth = (10.0 / 3.0, 10.0 / 3.0);
        let solution = solver
            .estimate_position(&distances_to(truth, &triangle()))
            .unwrap();

        assert!(euclidean_distance(solution.point(), truth) < 1e-6);
    }

    #[test]
    fn test_construction_errors() {
        let two = triangle()[..2].to_vec();
        assert!(matches!(
            PositionSolver::new(two),
            Err(LocError::Configuration(_))
        ));

        let mut duplicated = triangle();
        duplicated.push(AnchorPosition::new("d", 10.0, 0.0));
        assert!(matches!(
            PositionSolver::new(duplicated),
            Err(LocError::Configuration(_))
        ));
    }

    #[test]
    fn test_distance_count_mismatch() {
        let solver = PositionSolver::new(triangle()).unwrap();
        assert!(matches!(
            solver.estimate_position(&[1.0, 2.0]),
            Err(LocError::Argument(_))
        ));
    }

    #[test]
    fn test_non_finite_distance() {
        let solver = PositionSolver::new(triangle()).unwrap();
        for bad in [f64::INFINITY, f64::NAN] {
            assert!(matches!(
                solver.estimate_position(&[bad, 8.0, 6.7]),
                Err(LocError::Argument(_))
            ));
        }
    }

    #[test]
    fn test_inconsistent_distances() {
        // No point is 2 m from all three anchors; a full Gauss-Newton step overshoots here
        let distances = [2.0, 2.0, 2.0];

        let gauss_newton = PositionSolver::new(triangle()).unwrap();
        let nelder_mead = PositionSolver::new(triangle())
            .unwrap()
            .with_method(SolverMethod::NelderMead);

        let gn = gauss_newton.estimate_position(&distances).unwrap();
        let nm = nelder_mead.estimate_position(&distances).unwrap();
        let gn_cost = gauss_newton.objective(gn.point(), &distances);
        let nm_cost = nelder_mead.objective(nm.point(), &distances);

        assert!(gn_cost <= nm_cost * 1.01, "{} vs {}", gn_cost, nm_cost);
        assert!(euclidean_distance(gn.point(), (3.5406, 3.5406)) < 1e-2);
        assert!(gn_cost < gauss_newton.objective((10.0 / 3.0, 10.0 / 3.0), &distances));
    }

    #[test]
    fn test_estimate_multiple_positions() {
        let solver = PositionSolver::new(triangle()).unwrap();
        let lists: Vec<Vec<f64>> = [(3.0, 4.0), (1.0, 1.0), (7.0, 2.5)]
            .iter()
            .map(|&p| distances_to(p, &triangle()))
            .collect();

        let batch = solver.estimate_multiple_positions(&lists).unwrap();

        assert_eq!(batch.len(), lists.len());
        for (position, distances) in batch.iter().zip(&lists) {
            assert_eq!(*position, solver.estimate_position(distances).unwrap());
        }

        assert!(matches!(
            solver.estimate_multiple_positions(&[vec![1.0, 2.0, 3.0], vec![1.0]]),
            Err(LocError::Argument(_))
        ));
    }
}
