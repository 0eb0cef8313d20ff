pub mod newton;
pub mod normalized;
pub mod pod_galerkin;
pub mod warm_start;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

pub use newton::{NewtonConfig, NewtonSolver, Solution, SolveError};
pub use normalized::NormalizedSolver;
pub use pod_galerkin::{BatchReport, Formulation, PodGalerkin};
pub use warm_start::{FallbackPolicy, WarmStart};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    Absolute(f64),
    /// Absolute or relative to the initial residual, whichever is met first.
    Combined(f64, f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceMetric {
    #[default]
    L2Norm,
    MaxNorm,
}

/// Residual-based stopping rule shared by the iterative solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    pub tolerance: Tolerance,
    pub metric: ConvergenceMetric,
}

impl Convergence {
    pub fn absolute(tol: f64) -> Self {
        Self {
            tolerance: Tolerance::Absolute(tol),
            metric: ConvergenceMetric::L2Norm,
        }
    }

    pub fn norm(&self, vector: &DVector<f64>) -> f64 {
        match self.metric {
            ConvergenceMetric::L2Norm => vector.norm(),
            ConvergenceMetric::MaxNorm => vector.amax(),
        }
    }

    pub fn check_tolerance(&self, norm: f64, initial_norm: f64) -> bool {
        if norm == 0.0 {
            return true;
        }
        match self.tolerance {
            Tolerance::Absolute(tol) => norm <= tol,
            Tolerance::Combined(abs_tol, rel_tol) => {
                norm <= abs_tol || (norm / initial_norm) <= rel_tol
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_tolerance_accepts_either_test() {
        let conv = Convergence {
            tolerance: Tolerance::Combined(1e-8, 1e-3),
            metric: ConvergenceMetric::MaxNorm,
        };
        assert!(conv.check_tolerance(1e-9, 1.0));
        assert!(conv.check_tolerance(1e-4, 1.0));
        assert!(!conv.check_tolerance(1e-2, 1.0));
        assert_eq!(conv.norm(&DVector::from_vec(vec![1.0, -3.0])), 3.0);
    }

    #[test]
    fn exact_zero_residual_always_converges() {
        let conv = Convergence {
            tolerance: Tolerance::Combined(1e-12, 1e-6),
            metric: ConvergenceMetric::L2Norm,
        };
        assert!(conv.check_tolerance(0.0, 0.0));
    }

    #[test]
    fn residual_at_the_tolerance_converges() {
        let conv = Convergence::absolute(1e-8);
        assert!(conv.check_tolerance(1e-8, 1.0));
        assert!(!conv.check_tolerance(1.0000001e-8, 1.0));

        let conv = Convergence {
            tolerance: Tolerance::Combined(1e-12, 0.25),
            metric: ConvergenceMetric::L2Norm,
        };
        assert!(conv.check_tolerance(0.5, 2.0));
    }
}
