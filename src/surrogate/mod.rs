pub mod bundle;
pub mod loss;

pub use bundle::SurrogateBundle;
pub use loss::{equation_loss, labeled_loss, scale_inputs};

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, RomError};
use crate::numerics::PodGalerkin;
use crate::numerics::warm_start::ranked_samples;

/// Anything that maps a design vector to `M` basis coefficients.
///
/// Error evaluation only talks to this trait, so a POD-G solve, a lookup table
/// or an externally trained regressor can be compared on the same footing.
pub trait Surrogate {
    fn num_modes(&self) -> usize;

    fn predict(&self, alpha: &DVector<f64>) -> Result<DVector<f64>>;

    /// Queries are rows of `alphas`, predictions are columns of the result.
    fn predict_batch(&self, alphas: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let mut out = DMatrix::zeros(self.num_modes(), alphas.nrows());
        for q in 0..alphas.nrows() {
            let lambda = self.predict(&alphas.row(q).transpose())?;
            if lambda.len() != self.num_modes() {
                return Err(RomError::ShapeMismatch {
                    what: "predicted coefficients",
                    expected: self.num_modes(),
                    found: lambda.len(),
                });
            }
            out.set_column(q, &lambda);
        }
        Ok(out)
    }
}

impl Surrogate for PodGalerkin {
    fn num_modes(&self) -> usize {
        PodGalerkin::num_modes(self)
    }

    fn predict(&self, alpha: &DVector<f64>) -> Result<DVector<f64>> {
        Ok(self.solve(alpha)?.lambda)
    }
}

/// Returns the projection of the closest training sample. This is the warm
/// start of the Newton solve, and a floor any trained model should beat.
#[derive(Debug, Clone)]
pub struct NearestSample {
    parameters: DMatrix<f64>,
    projections: DMatrix<f64>,
    scale: Option<DVector<f64>>,
}

impl NearestSample {
    pub fn new(parameters: DMatrix<f64>, projections: DMatrix<f64>, scale: Option<DVector<f64>>) -> Result<Self> {
        if parameters.nrows() != projections.ncols() || parameters.nrows() == 0 {
            return Err(RomError::SampleCountMismatch {
                what: "nearest-sample table",
                left: parameters.nrows(),
                right: projections.ncols(),
            });
        }
        Ok(Self {
            parameters,
            projections,
            scale,
        })
    }

    pub fn from_model(model: &PodGalerkin) -> Result<Self> {
        Self::new(model.parameters().clone(), model.projections().clone(), None)
    }
}

impl Surrogate for NearestSample {
    fn num_modes(&self) -> usize {
        self.projections.nrows()
    }

    fn predict(&self, alpha: &DVector<f64>) -> Result<DVector<f64>> {
        if alpha.len() != self.parameters.ncols() {
            return Err(RomError::ShapeMismatch {
                what: "design parameters",
                expected: self.parameters.ncols(),
                found: alpha.len(),
            });
        }
        let nearest = ranked_samples(&self.parameters, alpha, self.scale.as_ref())[0];
        Ok(self.projections.column(nearest).into_owned())
    }
}
