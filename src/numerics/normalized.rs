use log::debug;
use nalgebra::{DMatrix, DVector};
use num_dual::{DualDVec64, jacobian};

use super::newton::{NewtonConfig, Solution, SolveError, log_iteration};
use super::Convergence;
use crate::basis::NormalizationStats;
use crate::physics::ReducedModel;

/// Damped Newton in normalized coefficients `z = (λ − mean) / std`.
///
/// The Jacobian comes from forward-mode automatic differentiation of the
/// residual, and every step is accepted only after an Armijo backtracking test.
#[derive(Debug, Clone)]
pub struct NormalizedSolver {
    pub convergence: Convergence,
    pub max_iterations: usize,
    /// Minimum step size before we give up (prevents infinite loops)
    pub min_step_size: f64,
    /// Parameter for sufficient decrease (usually 1e-4)
    pub armijo_param: f64,
    /// Largest allowed max-norm of a step in `z` (None = no limit)
    pub max_step: Option<f64>,
}

impl Default for NormalizedSolver {
    fn default() -> Self {
        Self {
            convergence: Convergence::absolute(1e-6),
            max_iterations: 50,
            min_step_size: 1e-3,
            armijo_param: 1e-4,
            max_step: None,
        }
    }
}

impl NormalizedSolver {
    pub fn new(config: &NewtonConfig) -> Self {
        Self {
            convergence: config.convergence(),
            max_iterations: config.max_iterations,
            ..Self::default()
        }
    }

    pub fn solve<M>(
        &self,
        model: &M,
        stats: &NormalizationStats,
        initial_guess: DVector<f64>,
        alpha: &DVector<f64>,
    ) -> Result<Solution, SolveError>
    where
        M: ReducedModel<f64> + ReducedModel<DualDVec64>,
    {
        let alpha_vec = || alpha.as_slice().to_vec();
        let mut z = stats.normalize(&initial_guess);
        let mut history = Vec::new();
        let mut previous_residual = None;

        debug!(
            "Newton-Armijo (normalized): {} unknowns, alpha = {:?}",
            <M as ReducedModel<f64>>::num_modes(model),
            alpha.as_slice()
        );

        for i in 0..=self.max_iterations {
            let (residual, jac) = self.residual_and_jacobian(model, stats, &z);
            if !residual.iter().all(|r| r.is_finite()) {
                return Err(SolveError::NonFiniteResidual {
                    alpha: alpha_vec(),
                    iteration: i,
                });
            }

            let current_res_norm = self.convergence.norm(&residual);
            history.push(current_res_norm);
            let init = history[0];
            let step_percent = previous_residual
                .map_or(0.0, |prev: f64| (prev - current_res_norm) / prev * 100.0);
            previous_residual = Some(current_res_norm);
            log_iteration(i, self.max_iterations, current_res_norm, current_res_norm / init, step_percent, init);

            if self.convergence.check_tolerance(current_res_norm, init) {
                return Ok(Solution {
                    lambda: stats.denormalize(&z),
                    iterations: i,
                    final_residual: current_res_norm,
                    history,
                });
            }
            if i == self.max_iterations {
                return Err(SolveError::MaxIterExceeded {
                    alpha: alpha_vec(),
                    iterations: i,
                    residual: current_res_norm,
                });
            }

            let mut delta_z = jac
                .lu()
                .solve(&-residual)
                .filter(|d| d.iter().all(|v| v.is_finite()))
                .ok_or_else(|| SolveError::SingularJacobian {
                    alpha: alpha_vec(),
                    iteration: i,
                })?;

            if let Some(max_step) = self.max_step {
                let max_update = delta_z.amax();
                if max_update > max_step {
                    delta_z *= max_step / max_update;
                }
            }

            // Backtracking line search on ||F_new|| <= (1 - step * c) ||F_old||
            let mut step = 1.0;
            let mut accepted = false;
            while step > self.min_step_size {
                let candidate = &z + &delta_z * step;
                let next_res = self.residual_only(model, stats, &candidate);
                let next_res_norm = self.convergence.norm(&next_res);
                if next_res_norm < (1.0 - step * self.armijo_param) * current_res_norm {
                    z = candidate;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }

            if !accepted {
                debug!("  Line search failed to find sufficient decrease.");
                return Err(SolveError::LineSearchFailed {
                    alpha: alpha_vec(),
                    iteration: i,
                    residual: current_res_norm,
                });
            }
        }

        Err(SolveError::MaxIterExceeded {
            alpha: alpha_vec(),
            iterations: self.max_iterations,
            residual: previous_residual.unwrap_or(f64::INFINITY),
        })
    }

    fn residual_only<M: ReducedModel<f64>>(
        &self,
        model: &M,
        stats: &NormalizationStats,
        z: &DVector<f64>,
    ) -> DVector<f64> {
        model.calculate_residual(stats.denormalize(z))
    }

    // A helper that wraps the call to the AD library.
    fn residual_and_jacobian<M: ReducedModel<DualDVec64>>(
        &self,
        model: &M,
        stats: &NormalizationStats,
        z: &DVector<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let (residual, jac) = jacobian(
            |arg: DVector<DualDVec64>| {
                let lambda = DVector::from_iterator(
                    arg.len(),
                    arg.iter().enumerate().map(|(k, zk)| {
                        zk.clone() * DualDVec64::from(stats.std[k]) + DualDVec64::from(stats.mean[k])
                    }),
                );
                model.calculate_residual(lambda)
            },
            z.clone(),
        );
        (residual, jac)
    }
}
