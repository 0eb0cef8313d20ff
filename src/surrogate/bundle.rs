use std::fs;
use std::path::Path;

use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::basis::{DesignSpace, NormalizationStats};
use crate::error::{Result, RomError, ensure_len};
use crate::numerics::PodGalerkin;
use crate::physics::operators::checked;
use crate::physics::{Forcing, Problem, ReducedOperators, ReducedSystem};

/// Everything an external trainer needs to fit `α ↦ λ`, and to penalise the
/// reduced residual while doing so.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateBundle {
    pub problem: Problem,
    /// `Ndof × M`
    pub modes: DMatrix<f64>,
    pub singular_values: DVector<f64>,
    pub operators: ReducedOperators,
    pub quadratic_groups: Vec<String>,
    pub linear_groups: Vec<String>,
    pub stats: NormalizationStats,
    pub design_space: DesignSpace,
    /// `NSample × P`
    pub labeled_inputs: DMatrix<f64>,
    /// `M × NSample`, projections of the training snapshots.
    pub labeled_outputs: DMatrix<f64>,
    /// Node coordinates of 1D problems, needed to rebuild the forcing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_nodes: Option<DVector<f64>>,
}

impl SurrogateBundle {
    pub fn from_model(model: &PodGalerkin) -> Self {
        let assembled = model.problem();
        let problem = assembled.problem.clone();
        let grid_nodes = match &assembled.forcing {
            Forcing::Manufactured(f) => Some(f.nodes().clone()),
            Forcing::Cavity(_) => None,
        };
        Self {
            quadratic_groups: problem.quadratic_groups().iter().map(|s| s.to_string()).collect(),
            linear_groups: problem.linear_groups().iter().map(|s| s.to_string()).collect(),
            problem,
            modes: model.basis().modes.clone(),
            singular_values: model.basis().singular_values.clone(),
            operators: assembled.operators.clone(),
            stats: model.stats().clone(),
            design_space: model.design_space().clone(),
            labeled_inputs: model.parameters().clone(),
            labeled_outputs: model.projections().clone(),
            grid_nodes,
        }
    }

    pub fn num_modes(&self) -> usize {
        self.modes.ncols()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_string(self)?)?;
        info!(
            "Wrote surrogate bundle ({} modes, {} labeled samples) to {}",
            self.num_modes(),
            self.labeled_inputs.nrows(),
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut bundle: Self = serde_json::from_str(&content)?;
        bundle.operators = checked(bundle.operators)?;
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<()> {
        let m = self.num_modes();
        ensure_len("operator modes", m, self.operators.num_modes())?;
        let (nq, nl) = self.operators.group_counts();
        ensure_len("quadratic group names", nq, self.quadratic_groups.len())?;
        ensure_len("linear group names", nl, self.linear_groups.len())?;
        ensure_len("normalization mean", m, self.stats.mean.len())?;
        ensure_len("normalization std", m, self.stats.std.len())?;
        ensure_len("labeled output rows", m, self.labeled_outputs.nrows())?;
        ensure_len("labeled input width", self.design_space.dim(), self.labeled_inputs.ncols())?;
        if self.labeled_inputs.nrows() != self.labeled_outputs.ncols() {
            return Err(RomError::SampleCountMismatch {
                what: "labeled inputs vs outputs",
                left: self.labeled_inputs.nrows(),
                right: self.labeled_outputs.ncols(),
            });
        }
        if let Some(nodes) = &self.grid_nodes {
            ensure_len("grid nodes", self.modes.nrows(), nodes.len())?;
        }
        Ok(())
    }

    /// Reduced system at `alpha`, rebuilt from the stored operators alone.
    pub fn system(&self, alpha: &DVector<f64>) -> Result<ReducedSystem> {
        let coeffs = self.problem.coefficients(alpha)?;
        let forcing = match &self.grid_nodes {
            Some(nodes) => self
                .problem
                .manufactured_forcing(nodes, &self.modes)
                .map(|f| f.project(alpha)),
            None => None,
        };
        self.operators.evaluate(&coeffs, forcing.as_ref())
    }
}
