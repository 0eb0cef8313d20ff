use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::newton::{NewtonConfig, NewtonSolver, Solution, SolveError};
use super::normalized::NormalizedSolver;
use super::warm_start::{FallbackPolicy, WarmStart, continuation_path, ranked_samples};
use crate::basis::{DesignSpace, NormalizationStats, PodBasis, SnapshotSet, compute_basis};
use crate::error::{Result, ensure_len};
use crate::physics::{AssembledProblem, Problem, ReducedSystem};

/// Which root finder runs the online solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formulation {
    /// Newton on `λ` with the analytic Jacobian.
    #[default]
    Newton,
    /// Damped Newton on normalized coefficients with an automatic Jacobian.
    Normalized,
}

/// Offline products of a POD-Galerkin model plus the online solve policy.
///
/// Everything is immutable after [`PodGalerkin::build`], so queries can run
/// concurrently.
#[derive(Debug, Clone)]
pub struct PodGalerkin {
    problem: AssembledProblem,
    basis: PodBasis,
    /// `M × NSample` projection of the training snapshots.
    projections: DMatrix<f64>,
    /// `NSample × P`
    parameters: DMatrix<f64>,
    design_space: DesignSpace,
    stats: NormalizationStats,
    newton: NewtonConfig,
    warm_start: WarmStart,
    fallback: FallbackPolicy,
    formulation: Formulation,
}

impl PodGalerkin {
    pub fn build(problem: &Problem, snapshots: &SnapshotSet, modes: usize) -> Result<Self> {
        let training = problem.training_matrix(snapshots)?;
        let basis = compute_basis(&training, modes)?;
        let projections = basis.project(&training)?;
        let stats = NormalizationStats::from_coefficients(&projections)?;
        let assembled = problem.assemble(snapshots, &basis.modes)?;
        info!(
            "POD-G model ready: {} modes from {} snapshots, energy captured {:.6}",
            modes,
            snapshots.num_samples(),
            basis.energy_fraction(modes)
        );
        Ok(Self {
            problem: assembled,
            basis,
            projections,
            parameters: snapshots.parameters.clone(),
            design_space: snapshots.design_space.clone(),
            stats,
            newton: NewtonConfig::for_problem(problem),
            warm_start: problem.default_warm_start(),
            fallback: FallbackPolicy::default(),
            formulation: Formulation::default(),
        })
    }

    pub fn with_newton(mut self, newton: NewtonConfig) -> Self {
        self.newton = newton;
        self
    }

    pub fn with_warm_start(mut self, warm_start: WarmStart) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    pub fn num_modes(&self) -> usize {
        self.basis.num_modes()
    }

    pub fn basis(&self) -> &PodBasis {
        &self.basis
    }

    pub fn problem(&self) -> &AssembledProblem {
        &self.problem
    }

    pub fn projections(&self) -> &DMatrix<f64> {
        &self.projections
    }

    pub fn parameters(&self) -> &DMatrix<f64> {
        &self.parameters
    }

    pub fn design_space(&self) -> &DesignSpace {
        &self.design_space
    }

    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    pub fn newton(&self) -> &NewtonConfig {
        &self.newton
    }

    pub fn warm_start(&self) -> WarmStart {
        self.warm_start
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    /// Same problem and online policy with a basis of `modes` modes.
    pub fn rebuild(&self, snapshots: &SnapshotSet, modes: usize) -> Result<Self> {
        Ok(Self::build(&self.problem.problem, snapshots, modes)?
            .with_newton(self.newton.clone())
            .with_warm_start(self.warm_start)
            .with_fallback(self.fallback)
            .with_formulation(self.formulation))
    }

    /// Reduced system at `alpha`, with parameter errors reported per query.
    pub fn system(&self, alpha: &DVector<f64>) -> std::result::Result<ReducedSystem, SolveError> {
        self.problem.system(alpha).map_err(|e| SolveError::InvalidQuery {
            alpha: alpha.as_slice().to_vec(),
            reason: e.to_string(),
        })
    }

    /// Training samples ordered by closeness to `alpha` under the warm-start rule.
    pub fn ranked_samples(&self, alpha: &DVector<f64>) -> Vec<usize> {
        match self.warm_start {
            WarmStart::NearestScaled | WarmStart::Provided => {
                ranked_samples(&self.parameters, alpha, Some(&self.design_space.width()))
            }
            WarmStart::Nearest => ranked_samples(&self.parameters, alpha, None),
        }
    }

    pub fn initial_guess(&self, alpha: &DVector<f64>) -> DVector<f64> {
        let nearest = self.ranked_samples(alpha)[0];
        self.projections.column(nearest).into_owned()
    }

    /// Solve one query from the warm start, applying the fallback policy on failure.
    pub fn solve(&self, alpha: &DVector<f64>) -> std::result::Result<Solution, SolveError> {
        let system = self.system(alpha)?;
        let ranked = self.ranked_samples(alpha);
        let first = self.projections.column(ranked[0]).into_owned();
        match self.attempt(&system, first, alpha) {
            Ok(solution) => Ok(solution),
            Err(err) => self.recover(&system, alpha, &ranked, err),
        }
    }

    /// Solve one query from caller supplied coefficients. No fallback is tried.
    pub fn solve_from(
        &self,
        alpha: &DVector<f64>,
        initial_guess: DVector<f64>,
    ) -> std::result::Result<Solution, SolveError> {
        let system = self.system(alpha)?;
        if initial_guess.len() != self.num_modes() {
            return Err(SolveError::InvalidQuery {
                alpha: alpha.as_slice().to_vec(),
                reason: format!(
                    "initial guess has {} coefficients, expected {}",
                    initial_guess.len(),
                    self.num_modes()
                ),
            });
        }
        self.attempt(&system, initial_guess, alpha)
    }

    /// Queries are rows of `alphas`.
    pub fn solve_batch(&self, alphas: &DMatrix<f64>) -> BatchReport {
        let results = (0..alphas.nrows())
            .map(|q| self.solve(&alphas.row(q).transpose()))
            .collect();
        self.report(alphas, results)
    }

    /// Same as [`solve_batch`](Self::solve_batch) with queries spread over the
    /// rayon pool. Result order matches the rows of `alphas`.
    pub fn solve_batch_par(&self, alphas: &DMatrix<f64>) -> BatchReport {
        let results = (0..alphas.nrows())
            .into_par_iter()
            .map(|q| self.solve(&alphas.row(q).transpose()))
            .collect();
        self.report(alphas, results)
    }

    /// Batch with one initial guess per query (columns of `initial_guesses`).
    pub fn solve_batch_from(
        &self,
        alphas: &DMatrix<f64>,
        initial_guesses: &DMatrix<f64>,
    ) -> Result<BatchReport> {
        ensure_len("initial guesses", alphas.nrows(), initial_guesses.ncols())?;
        let results = (0..alphas.nrows())
            .map(|q| {
                self.solve_from(
                    &alphas.row(q).transpose(),
                    initial_guesses.column(q).into_owned(),
                )
            })
            .collect();
        Ok(self.report(alphas, results))
    }

    /// Solve every row of `alphas`. With [`WarmStart::Provided`] and reference
    /// fields (`exact`, one column per query) each query starts from the
    /// projection of its own reference, and no fallback is tried.
    pub fn solve_queries(
        &self,
        alphas: &DMatrix<f64>,
        exact: Option<&DMatrix<f64>>,
        parallel: bool,
    ) -> Result<BatchReport> {
        match (self.warm_start, exact) {
            (WarmStart::Provided, Some(exact)) => {
                let guesses = self.basis.project(exact)?;
                self.solve_batch_from(alphas, &guesses)
            }
            (WarmStart::Provided, None) => {
                warn!("No reference fields to start from, using the nearest samples");
                Ok(self.solve_batch(alphas))
            }
            _ if parallel => Ok(self.solve_batch_par(alphas)),
            _ => Ok(self.solve_batch(alphas)),
        }
    }

    fn report(&self, alphas: &DMatrix<f64>, results: Vec<std::result::Result<Solution, SolveError>>) -> BatchReport {
        let report = BatchReport {
            num_modes: self.num_modes(),
            alphas: alphas.clone(),
            results,
        };
        info!(
            "Batch finished: {}/{} queries converged",
            report.converged(),
            report.len()
        );
        report
    }

    fn attempt(
        &self,
        system: &ReducedSystem,
        initial_guess: DVector<f64>,
        alpha: &DVector<f64>,
    ) -> std::result::Result<Solution, SolveError> {
        match self.formulation {
            Formulation::Newton => NewtonSolver::new(&self.newton).solve(system, initial_guess, alpha),
            Formulation::Normalized => {
                NormalizedSolver::new(&self.newton).solve(system, &self.stats, initial_guess, alpha)
            }
        }
    }

    fn recover(
        &self,
        system: &ReducedSystem,
        alpha: &DVector<f64>,
        ranked: &[usize],
        err: SolveError,
    ) -> std::result::Result<Solution, SolveError> {
        match self.fallback {
            FallbackPolicy::None => Err(err),
            FallbackPolicy::NextNearest { attempts } => {
                let retries: Vec<usize> = ranked.iter().skip(1).take(attempts).copied().collect();
                for &s in &retries {
                    let guess = self.projections.column(s).into_owned();
                    if let Ok(solution) = self.attempt(system, guess, alpha) {
                        info!("Case {:?} recovered from sample {s}", alpha.as_slice());
                        return Ok(solution);
                    }
                }
                warn!("Case {:?} failed from {} warm starts: {err}", alpha.as_slice(), retries.len() + 1);
                Err(err)
            }
            FallbackPolicy::Continuation { steps } => {
                let start = self.parameters.row(ranked[0]).transpose();
                let mut lambda = self.projections.column(ranked[0]).into_owned();
                let mut last = None;
                for point in continuation_path(&start, alpha, steps) {
                    let step = self
                        .system(&point)
                        .and_then(|sys| self.attempt(&sys, lambda.clone(), &point));
                    match step {
                        Ok(solution) => {
                            lambda = solution.lambda.clone();
                            last = Some(solution);
                        }
                        Err(step_err) => {
                            warn!(
                                "Continuation towards {:?} stopped at {:?}: {step_err}",
                                alpha.as_slice(),
                                point.as_slice()
                            );
                            return Err(err);
                        }
                    }
                }
                last.ok_or(err)
            }
        }
    }
}

/// Outcome of a batch of queries, in query order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub num_modes: usize,
    /// One query per row.
    pub alphas: DMatrix<f64>,
    pub results: Vec<std::result::Result<Solution, SolveError>>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn converged(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn all_converged(&self) -> bool {
        self.converged() == self.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &SolveError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(q, r)| r.as_ref().err().map(|e| (q, e)))
    }

    /// `M × NQuery` coefficients; failed queries are filled with `sentinel`.
    pub fn coefficients(&self, sentinel: f64) -> DMatrix<f64> {
        let mut out = DMatrix::from_element(self.num_modes, self.len(), sentinel);
        for (q, result) in self.results.iter().enumerate() {
            if let Ok(solution) = result {
                out.set_column(q, &solution.lambda);
            }
        }
        out
    }
}
