use log::{debug, log_enabled, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Convergence, ConvergenceMetric, Tolerance};
use crate::physics::{Problem, ReducedSystem};

fn default_tolerance() -> f64 {
    1e-10
}

fn default_max_iterations() -> usize {
    100
}

/// Stopping rule for the online solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Also accept `‖R‖ / ‖R₀‖` below this value.
    #[serde(default)]
    pub relative_tolerance: Option<f64>,
    #[serde(default)]
    pub metric: ConvergenceMetric,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            relative_tolerance: None,
            metric: ConvergenceMetric::L2Norm,
        }
    }
}

impl NewtonConfig {
    pub fn for_problem(problem: &Problem) -> Self {
        Self {
            tolerance: problem.default_tolerance(),
            ..Self::default()
        }
    }

    pub fn convergence(&self) -> Convergence {
        let tolerance = match self.relative_tolerance {
            Some(rel) => Tolerance::Combined(self.tolerance, rel),
            None => Tolerance::Absolute(self.tolerance),
        };
        Convergence {
            tolerance,
            metric: self.metric,
        }
    }
}

/// Per-query failure. The batch keeps going; the caller decides what to do.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("no convergence after {iterations} iterations at alpha = {alpha:?}, residual {residual:.3e}")]
    MaxIterExceeded {
        alpha: Vec<f64>,
        iterations: usize,
        residual: f64,
    },
    #[error("singular Jacobian at iteration {iteration} for alpha = {alpha:?}")]
    SingularJacobian { alpha: Vec<f64>, iteration: usize },
    #[error("residual is not finite at iteration {iteration} for alpha = {alpha:?}")]
    NonFiniteResidual { alpha: Vec<f64>, iteration: usize },
    #[error("line search stalled at iteration {iteration} for alpha = {alpha:?}, residual {residual:.3e}")]
    LineSearchFailed {
        alpha: Vec<f64>,
        iteration: usize,
        residual: f64,
    },
    #[error("invalid query alpha = {alpha:?}: {reason}")]
    InvalidQuery { alpha: Vec<f64>, reason: String },
}

impl SolveError {
    pub fn alpha(&self) -> &[f64] {
        match self {
            SolveError::MaxIterExceeded { alpha, .. }
            | SolveError::SingularJacobian { alpha, .. }
            | SolveError::NonFiniteResidual { alpha, .. }
            | SolveError::LineSearchFailed { alpha, .. }
            | SolveError::InvalidQuery { alpha, .. } => alpha,
        }
    }

    /// Residual reached before giving up, where one was computed.
    pub fn residual(&self) -> Option<f64> {
        match self {
            SolveError::MaxIterExceeded { residual, .. }
            | SolveError::LineSearchFailed { residual, .. } => Some(*residual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub lambda: DVector<f64>,
    pub iterations: usize,
    pub final_residual: f64,
    /// Residual norm at every iterate, initial guess first.
    pub history: Vec<f64>,
}

/// Plain Newton on `R(λ) = λᵗAλ + Bλ − source` with the analytic Jacobian
/// `(A + Aᵗ)λ + B` and a dense LU solve per step.
#[derive(Debug, Clone)]
pub struct NewtonSolver {
    pub convergence: Convergence,
    pub max_iterations: usize,
}

impl NewtonSolver {
    pub fn new(config: &NewtonConfig) -> Self {
        Self {
            convergence: config.convergence(),
            max_iterations: config.max_iterations,
        }
    }

    pub fn solve(
        &self,
        system: &ReducedSystem,
        initial_guess: DVector<f64>,
        alpha: &DVector<f64>,
    ) -> Result<Solution, SolveError> {
        let mut lambda = initial_guess;
        let mut history = Vec::new();
        let mut previous_residual = None;

        debug!("Newton: {} unknowns, alpha = {:?}", lambda.len(), alpha.as_slice());
        debug!("    Iter   | Residual |  Fraction |  Step % |  Initial");

        let mut iteration = 0;
        loop {
            let residual = system.residual(&lambda);
            if !residual.iter().all(|r| r.is_finite()) {
                return Err(SolveError::NonFiniteResidual {
                    alpha: alpha.as_slice().to_vec(),
                    iteration,
                });
            }

            let res_norm = self.convergence.norm(&residual);
            history.push(res_norm);
            let init = history[0];
            let step_percent =
                previous_residual.map_or(0.0, |prev: f64| (prev - res_norm) / prev * 100.0);
            previous_residual = Some(res_norm);
            log_iteration(iteration, self.max_iterations, res_norm, res_norm / init, step_percent, init);

            if self.convergence.check_tolerance(res_norm, init) {
                return Ok(Solution {
                    lambda,
                    iterations: iteration,
                    final_residual: res_norm,
                    history,
                });
            }
            if iteration >= self.max_iterations {
                warn!(
                    "Case {:?} can only reach a residual of {:.3e}",
                    alpha.as_slice(),
                    res_norm
                );
                return Err(SolveError::MaxIterExceeded {
                    alpha: alpha.as_slice().to_vec(),
                    iterations: iteration,
                    residual: res_norm,
                });
            }

            let delta = system
                .jacobian(&lambda)
                .lu()
                .solve(&-residual)
                .filter(|d| d.iter().all(|v| v.is_finite()))
                .ok_or_else(|| SolveError::SingularJacobian {
                    alpha: alpha.as_slice().to_vec(),
                    iteration,
                })?;
            lambda += delta;
            iteration += 1;
        }
    }
}

pub(crate) fn log_iteration(
    i: usize,
    max_iter: usize,
    res_norm: f64,
    fraction: f64,
    step_percent: f64,
    init: f64,
) {
    if !log_enabled!(log::Level::Debug) {
        return;
    }
    debug!("{i:>4}/{max_iter} | {res_norm:>8.3e} | {fraction:>9.3e} | {step_percent:>6.2}% | {init:>8.3e}");
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::physics::QuadraticTensor;

    fn scalar_system(a: f64, b: f64, source: f64) -> ReducedSystem {
        ReducedSystem::new(
            QuadraticTensor::from_fn(1, |_, _, _| a),
            DMatrix::from_element(1, 1, b),
            DVector::from_element(1, source),
        )
        .unwrap()
    }

    fn solver(max_iterations: usize) -> NewtonSolver {
        NewtonSolver::new(&NewtonConfig {
            max_iterations,
            ..NewtonConfig::default()
        })
    }

    #[test]
    fn converges_quadratically_on_scalar_root() {
        // λ² + λ − 2 = 0 has a root at λ = 1
        let sys = scalar_system(1.0, 1.0, 2.0);
        let alpha = DVector::from_element(1, 0.0);
        let sol = solver(100).solve(&sys, DVector::from_element(1, 1.5), &alpha).unwrap();
        assert!((sol.lambda[0] - 1.0).abs() < 1e-12);
        assert!(sol.iterations <= 6, "took {} iterations", sol.iterations);
        assert_eq!(sol.history.len(), sol.iterations + 1);
    }

    #[test]
    fn zero_iterations_when_guess_is_exact() {
        let sys = scalar_system(0.0, 2.0, 4.0);
        let alpha = DVector::from_element(1, 0.0);
        let sol = solver(100).solve(&sys, DVector::from_element(1, 2.0), &alpha).unwrap();
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn no_real_root_exhausts_iterations() {
        // λ² + 1 = 0
        let sys = scalar_system(1.0, 0.0, -1.0);
        let alpha = DVector::from_vec(vec![1.5, 2.5]);
        match solver(100).solve(&sys, DVector::from_element(1, 0.3), &alpha) {
            Err(SolveError::MaxIterExceeded {
                alpha, iterations, ..
            }) => {
                assert_eq!(iterations, 100);
                assert_eq!(alpha, vec![1.5, 2.5]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn zero_jacobian_is_reported_as_singular() {
        let sys = scalar_system(0.0, 0.0, 1.0);
        let alpha = DVector::from_element(2, 1.0);
        assert!(matches!(
            solver(100).solve(&sys, DVector::from_element(1, 0.0), &alpha),
            Err(SolveError::SingularJacobian { iteration: 0, .. })
        ));
    }
}
