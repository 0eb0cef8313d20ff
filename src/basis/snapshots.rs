use std::fs;
use std::path::Path;

use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::layout::LOADED_VARS;
use crate::discretization::ChebyshevGrid;
use crate::error::{Result, RomError, ensure_len};

/// Rectangular box of admissible design parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpace {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl DesignSpace {
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Result<Self> {
        ensure_len("design space bounds", lower.len(), upper.len())?;
        if lower.is_empty() {
            return Err(RomError::InvalidDesignSpace("no parameters".into()));
        }
        for (k, (lo, hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !(lo < hi) {
                return Err(RomError::InvalidDesignSpace(format!(
                    "component {k}: lower {lo} is not below upper {hi}"
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    /// Build from the `2 × P` layout used in snapshot files (row 0 lower, row 1 upper).
    pub fn from_rows(bounds: &DMatrix<f64>) -> Result<Self> {
        ensure_len("design_space rows", 2, bounds.nrows())?;
        Self::new(
            bounds.row(0).transpose().into_owned(),
            bounds.row(1).transpose().into_owned(),
        )
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn width(&self) -> DVector<f64> {
        &self.upper - &self.lower
    }

    pub fn contains(&self, alpha: &DVector<f64>) -> bool {
        alpha.len() == self.dim()
            && alpha
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(a, (lo, hi))| *a >= *lo && *a <= *hi)
    }

    /// Map a parameter vector affinely onto `[-1, 1]^P`.
    pub fn to_unit(&self, alpha: &DVector<f64>) -> DVector<f64> {
        let centre = (&self.upper + &self.lower) * 0.5;
        (alpha - centre).component_div(&self.width()) * 2.0
    }
}

/// Spatial description stored next to the snapshot matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSpec {
    /// 1D problems: node coordinates, one row of the snapshot matrix per node.
    Line { nodes: DVector<f64> },
    /// 2D problems: `(nx, ny)` tensor grid, `LOADED_VARS` interleaved rows per node.
    Tensor { shape: (usize, usize) },
}

impl GridSpec {
    pub fn dof(&self) -> usize {
        match self {
            GridSpec::Line { nodes } => nodes.len(),
            GridSpec::Tensor { shape } => shape.0 * shape.1 * LOADED_VARS,
        }
    }
}

/// Library of high-fidelity solutions, one column per sampled design point.
#[derive(Debug, Clone)]
pub struct SnapshotSet {
    pub samples: DMatrix<f64>,
    pub grid: GridSpec,
    /// `NSample × P`, row `s` is the design point of column `s` of `samples`.
    pub parameters: DMatrix<f64>,
    pub design_space: DesignSpace,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(rename = "Samples")]
    samples: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xgrid: Option<Vec<f64>>,
    #[serde(rename = "FieldShape", default, skip_serializing_if = "Option::is_none")]
    field_shape: Option<[usize; 2]>,
    parameters: Vec<Vec<f64>>,
    design_space: Vec<Vec<f64>>,
}

impl SnapshotSet {
    pub fn new(
        samples: DMatrix<f64>,
        grid: GridSpec,
        parameters: DMatrix<f64>,
        design_space: DesignSpace,
    ) -> Result<Self> {
        ensure_len("snapshot rows", grid.dof(), samples.nrows())?;
        if samples.ncols() != parameters.nrows() {
            return Err(RomError::SampleCountMismatch {
                what: "snapshots vs parameters",
                left: samples.ncols(),
                right: parameters.nrows(),
            });
        }
        ensure_len("parameter width", design_space.dim(), parameters.ncols())?;
        Ok(Self {
            samples,
            grid,
            parameters,
            design_space,
        })
    }

    /// Evaluate a closed-form field family at every grid node and design point.
    pub fn sample_manufactured(
        grid: &ChebyshevGrid,
        parameters: DMatrix<f64>,
        design_space: DesignSpace,
        field: impl Fn(f64, &DVector<f64>) -> f64,
    ) -> Result<Self> {
        let nodes = grid.nodes().clone();
        let samples = DMatrix::from_fn(nodes.len(), parameters.nrows(), |n, s| {
            let alpha = parameters.row(s).transpose();
            field(nodes[n], &alpha)
        });
        Self::new(samples, GridSpec::Line { nodes }, parameters, design_space)
    }

    pub fn num_samples(&self) -> usize {
        self.samples.ncols()
    }

    pub fn dof(&self) -> usize {
        self.samples.nrows()
    }

    pub fn parameter(&self, s: usize) -> DVector<f64> {
        self.parameters.row(s).transpose()
    }

    /// Keep only the first `n` snapshots.
    pub fn subset(&self, n: usize) -> Result<Self> {
        if n == 0 || n > self.num_samples() {
            return Err(RomError::SampleCountMismatch {
                what: "snapshot subset",
                left: n,
                right: self.num_samples(),
            });
        }
        Self::new(
            self.samples.columns(0, n).into_owned(),
            self.grid.clone(),
            self.parameters.rows(0, n).into_owned(),
            self.design_space.clone(),
        )
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let file: SnapshotFile = serde_json::from_str(&content)?;

        let samples = matrix_from_rows("Samples", &file.samples)?;
        let parameters = matrix_from_rows("parameters", &file.parameters)?;
        let bounds = matrix_from_rows("design_space", &file.design_space)?;
        let grid = match (file.xgrid, file.field_shape) {
            (Some(nodes), _) => GridSpec::Line {
                nodes: DVector::from_vec(nodes),
            },
            (None, Some([nx, ny])) => GridSpec::Tensor { shape: (nx, ny) },
            (None, None) => return Err(RomError::MissingArray("xgrid")),
        };

        let set = Self::new(samples, grid, parameters, DesignSpace::from_rows(&bounds)?)?;
        info!(
            "Loaded {} snapshots with {} degrees of freedom from {}",
            set.num_samples(),
            set.dof(),
            path.as_ref().display()
        );
        Ok(set)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (xgrid, field_shape) = match &self.grid {
            GridSpec::Line { nodes } => (Some(nodes.as_slice().to_vec()), None),
            GridSpec::Tensor { shape } => (None, Some([shape.0, shape.1])),
        };
        let file = SnapshotFile {
            samples: rows_of(&self.samples),
            xgrid,
            field_shape,
            parameters: rows_of(&self.parameters),
            design_space: vec![
                self.design_space.lower.as_slice().to_vec(),
                self.design_space.upper.as_slice().to_vec(),
            ],
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        Ok(())
    }
}

pub(crate) fn matrix_from_rows(what: &'static str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let Some(first) = rows.first() else {
        return Err(RomError::MissingArray(what));
    };
    let ncols = first.len();
    for row in rows {
        ensure_len(what, ncols, row.len())?;
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

pub(crate) fn rows_of(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}
