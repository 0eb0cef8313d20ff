use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{Coefficients, ReducedOperators, ReducedSystem};
use crate::basis::{GridSpec, SnapshotSet};
use crate::discretization::ChebyshevGrid;
use crate::error::{Result, RomError, ensure_len};
use crate::models::convection::{self, NaturalConvection};
use crate::models::manufactured::{Manufactured, ManufacturedForcing, Transport};
use crate::models::{advdiff, burgers};
use crate::numerics::WarmStart;

fn default_x_coef() -> f64 {
    0.5
}

fn default_y_coef() -> f64 {
    0.5
}

/// The supported PDEs and their fixed physical constants. Everything that varies
/// between queries is in the design vector `α`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// `V φ_x − a φ_xx = f`, `α` selects the manufactured solution.
    AdvectionDiffusion1d {
        velocity: f64,
        diffusivity: f64,
        #[serde(default)]
        family: Manufactured,
    },
    /// `φ φ_x − a φ_xx = f`, `α` selects the manufactured solution.
    Burgers1d {
        viscosity: f64,
        #[serde(default)]
        family: Manufactured,
    },
    /// Tilted cavity, `α = (Ra, Pr, θ°)`, physical size `x_coef × y_coef` times
    /// the reference square.
    NaturalConvection2d {
        #[serde(default = "default_x_coef")]
        x_coef: f64,
        #[serde(default = "default_y_coef")]
        y_coef: f64,
    },
}

impl Problem {
    pub fn name(&self) -> &'static str {
        match self {
            Problem::AdvectionDiffusion1d { .. } => "advection-diffusion 1D",
            Problem::Burgers1d { .. } => "Burgers 1D",
            Problem::NaturalConvection2d { .. } => "natural convection 2D",
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Problem::NaturalConvection2d { .. } => 3,
            _ => 2,
        }
    }

    pub fn quadratic_groups(&self) -> Vec<&'static str> {
        match self {
            Problem::NaturalConvection2d { .. } => convection::QUADRATIC_GROUPS.to_vec(),
            _ => vec!["advection"],
        }
    }

    pub fn linear_groups(&self) -> Vec<&'static str> {
        match self {
            Problem::NaturalConvection2d { .. } => convection::LINEAR_GROUPS.to_vec(),
            _ => vec!["diffusion"],
        }
    }

    /// Warm-start rule when the configuration does not name one. The cavity
    /// parameters differ by orders of magnitude, so distances are measured in
    /// units of the design-space width.
    pub fn default_warm_start(&self) -> WarmStart {
        match self {
            Problem::NaturalConvection2d { .. } => WarmStart::NearestScaled,
            _ => WarmStart::Nearest,
        }
    }

    /// Default residual tolerance for the online solve.
    pub fn default_tolerance(&self) -> f64 {
        match self {
            Problem::NaturalConvection2d { .. } => 1e-6,
            _ => 1e-10,
        }
    }

    pub fn coefficients(&self, alpha: &DVector<f64>) -> Result<Coefficients> {
        match self {
            Problem::NaturalConvection2d { .. } => convection::coefficients(alpha),
            _ => {
                ensure_len("design parameters", self.parameter_count(), alpha.len())?;
                Ok(Coefficients {
                    quadratic: vec![1.0],
                    linear: vec![1.0],
                })
            }
        }
    }

    /// Restrict the snapshot matrix to the unknowns the basis is built on.
    pub fn training_matrix(&self, snapshots: &SnapshotSet) -> Result<DMatrix<f64>> {
        match self {
            Problem::NaturalConvection2d { x_coef, y_coef } => {
                NaturalConvection::from_snapshots(snapshots, *x_coef, *y_coef)?
                    .training_matrix(snapshots)
            }
            _ => Ok(snapshots.samples.clone()),
        }
    }

    /// Contract operators with `modes` once; the result is reused for every query.
    pub fn assemble(&self, snapshots: &SnapshotSet, modes: &DMatrix<f64>) -> Result<AssembledProblem> {
        ensure_len(
            "design parameters",
            self.parameter_count(),
            snapshots.design_space.dim(),
        )?;
        let assembled = match self {
            Problem::AdvectionDiffusion1d {
                velocity,
                diffusivity,
                ..
            } => {
                let grid = line_grid(snapshots)?;
                let operators = advdiff::assemble(&grid, modes, *velocity, *diffusivity)?;
                self.with_line_forcing(operators, &grid, modes)?
            }
            Problem::Burgers1d { viscosity, .. } => {
                let grid = line_grid(snapshots)?;
                let operators = burgers::assemble(&grid, modes, *viscosity)?;
                self.with_line_forcing(operators, &grid, modes)?
            }
            Problem::NaturalConvection2d { x_coef, y_coef } => {
                let model = NaturalConvection::from_snapshots(snapshots, *x_coef, *y_coef)?;
                let operators = model.assemble(modes)?;
                AssembledProblem {
                    problem: self.clone(),
                    operators,
                    forcing: Forcing::Cavity(Box::new(model)),
                }
            }
        };
        assembled.operators.validate()?;
        info!(
            "Assembled {} reduced operators: {} modes, {} quadratic / {} linear groups",
            self.name(),
            assembled.operators.num_modes(),
            assembled.operators.quadratic.len(),
            assembled.operators.linear.len()
        );
        Ok(assembled)
    }

    /// Forcing that makes the manufactured family exact on `nodes`. `None` for
    /// problems driven by boundary data.
    pub fn manufactured_forcing(
        &self,
        nodes: &DVector<f64>,
        modes: &DMatrix<f64>,
    ) -> Option<ManufacturedForcing> {
        let (family, transport, diffusivity) = match self {
            Problem::AdvectionDiffusion1d {
                velocity,
                diffusivity,
                family,
            } => (
                *family,
                Transport::Linear {
                    velocity: *velocity,
                },
                *diffusivity,
            ),
            Problem::Burgers1d { viscosity, family } => (*family, Transport::Burgers, *viscosity),
            Problem::NaturalConvection2d { .. } => return None,
        };
        Some(ManufacturedForcing::new(
            nodes.clone(),
            modes.clone(),
            family,
            transport,
            diffusivity,
        ))
    }

    fn with_line_forcing(
        &self,
        operators: ReducedOperators,
        grid: &ChebyshevGrid,
        modes: &DMatrix<f64>,
    ) -> Result<AssembledProblem> {
        let forcing = self
            .manufactured_forcing(grid.nodes(), modes)
            .ok_or_else(|| RomError::InvalidConfig {
                key: "problem",
                reason: format!("{} has no manufactured forcing", self.name()),
            })?;
        Ok(AssembledProblem {
            problem: self.clone(),
            operators,
            forcing: Forcing::Manufactured(forcing),
        })
    }
}

/// Nodes of a 1D snapshot grid must be Chebyshev–Gauss–Lobatto points.
fn line_grid(snapshots: &SnapshotSet) -> Result<ChebyshevGrid> {
    let GridSpec::Line { nodes } = &snapshots.grid else {
        return Err(RomError::InvalidConfig {
            key: "xgrid",
            reason: "1D problems need a line grid".into(),
        });
    };
    let n = nodes.len();
    if n < 3 {
        return Err(RomError::InvalidConfig {
            key: "xgrid",
            reason: format!("need at least 3 nodes, got {n}"),
        });
    }
    let grid = ChebyshevGrid::new(n - 1, (nodes[0], nodes[n - 1]))?;
    let gap = (grid.nodes() - nodes).amax();
    if gap > 1e-8 * (nodes[n - 1] - nodes[0]).abs() {
        return Err(RomError::InvalidConfig {
            key: "xgrid",
            reason: format!("nodes are not Chebyshev-Gauss-Lobatto points (max gap {gap:.3e})"),
        });
    }
    Ok(grid)
}

/// Query-dependent right-hand side data.
#[derive(Debug, Clone)]
pub enum Forcing {
    Manufactured(ManufacturedForcing),
    /// Boundary forcing already lives in the operators; the model is kept for
    /// field reconstruction.
    Cavity(Box<NaturalConvection>),
}

/// Operators plus whatever a query needs to turn `α` into a reduced system.
#[derive(Debug, Clone)]
pub struct AssembledProblem {
    pub problem: Problem,
    pub operators: ReducedOperators,
    pub forcing: Forcing,
}

impl AssembledProblem {
    pub fn num_modes(&self) -> usize {
        self.operators.num_modes()
    }

    pub fn system(&self, alpha: &DVector<f64>) -> Result<ReducedSystem> {
        let coeffs = self.problem.coefficients(alpha)?;
        match &self.forcing {
            Forcing::Manufactured(f) => self.operators.evaluate(&coeffs, Some(&f.project(alpha))),
            Forcing::Cavity(_) => self.operators.evaluate(&coeffs, None),
        }
    }

    /// Closed-form solution at `α`, when the problem has one.
    pub fn exact_field(&self, alpha: &DVector<f64>) -> Option<DVector<f64>> {
        match &self.forcing {
            Forcing::Manufactured(f) => Some(f.exact(alpha)),
            Forcing::Cavity(_) => None,
        }
    }

    pub fn cavity(&self) -> Option<&NaturalConvection> {
        match &self.forcing {
            Forcing::Cavity(model) => Some(model.as_ref()),
            Forcing::Manufactured(_) => None,
        }
    }
}
