//! Loss terms for training coefficient regressors against a POD basis.
//!
//! `equation_loss` is the physics term of POD-PINN training and `labeled_loss`
//! the data term shared with POD-NN. Both are plain means of squares so the
//! trainer can weight and sum them.

use nalgebra::{DMatrix, DVector};

use crate::basis::{DesignSpace, NormalizationStats};
use crate::error::{Result, RomError, ensure_len};
use crate::physics::ReducedSystem;

/// Map each row of `alphas` (`NQ × P`) onto `[−1, 1]^P`.
pub fn scale_inputs(design_space: &DesignSpace, alphas: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    ensure_len("design parameters", design_space.dim(), alphas.ncols())?;
    let mut scaled = alphas.clone();
    for (q, row) in alphas.row_iter().enumerate() {
        let unit = design_space.to_unit(&row.transpose());
        scaled.set_row(q, &unit.transpose());
    }
    Ok(scaled)
}

/// Mean square reduced residual over a batch. `lambdas` is `M × NQ`, column `q`
/// belonging to row `q` of `alphas`.
pub fn equation_loss<F>(system_at: F, alphas: &DMatrix<f64>, lambdas: &DMatrix<f64>) -> Result<f64>
where
    F: Fn(&DVector<f64>) -> Result<ReducedSystem>,
{
    check_batch(alphas.nrows(), lambdas.ncols())?;
    let mut total = 0.0;
    for q in 0..alphas.nrows() {
        let system = system_at(&alphas.row(q).transpose())?;
        ensure_len("predicted coefficients", system.dim(), lambdas.nrows())?;
        total += system.residual(&lambdas.column(q).into_owned()).norm_squared();
    }
    Ok(total / (alphas.nrows() * lambdas.nrows()) as f64)
}

/// Mean square mismatch in normalized units, `((label − pred) / std)²`.
pub fn labeled_loss(
    stats: &NormalizationStats,
    predicted: &DMatrix<f64>,
    labels: &DMatrix<f64>,
) -> Result<f64> {
    check_batch(labels.ncols(), predicted.ncols())?;
    ensure_len("predicted coefficients", labels.nrows(), predicted.nrows())?;
    ensure_len("normalization std", labels.nrows(), stats.std.len())?;
    let mut total = 0.0;
    for (label, pred) in labels.column_iter().zip(predicted.column_iter()) {
        total += (label - pred).component_div(&stats.std).norm_squared();
    }
    Ok(total / labels.len() as f64)
}

fn check_batch(left: usize, right: usize) -> Result<()> {
    if left != right || left == 0 {
        return Err(RomError::SampleCountMismatch {
            what: "loss batch",
            left,
            right,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::QuadraticTensor;

    #[test]
    fn inputs_land_on_unit_box() {
        let space = DesignSpace::new(DVector::from_vec(vec![1e4, 45.0]), DVector::from_vec(vec![1e5, 90.0])).unwrap();
        let alphas = DMatrix::from_row_slice(2, 2, &[1e4, 90.0, 5.5e4, 67.5]);
        let scaled = scale_inputs(&space, &alphas).unwrap();
        assert!((scaled - DMatrix::from_row_slice(2, 2, &[-1.0, 1.0, 0.0, 0.0])).amax() < 1e-12);
    }

    #[test]
    fn equation_loss_vanishes_at_roots() {
        // λ + 0.5 λ² = source, scaled by α
        let system_at = |alpha: &DVector<f64>| {
            ReducedSystem::new(
                QuadraticTensor::from_fn(1, |_, _, _| 0.5),
                DMatrix::from_element(1, 1, 1.0),
                DVector::from_element(1, 1.5 * alpha[0]),
            )
        };
        let alphas = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let exact = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        assert!(equation_loss(system_at, &alphas, &exact).unwrap() < 1e-30);

        // λ = 0 leaves a residual of −1.5, λ = 1 is still a root
        let off = DMatrix::from_row_slice(1, 2, &[0.0, 1.0]);
        let loss = equation_loss(system_at, &alphas, &off).unwrap();
        assert!((loss - 1.5f64.powi(2) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn labeled_loss_uses_normalized_units() {
        let stats = NormalizationStats {
            mean: DVector::zeros(2),
            std: DVector::from_vec(vec![2.0, 0.5]),
        };
        let labels = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let pred = DMatrix::from_row_slice(2, 1, &[0.0, 0.5]);
        // (1/2)² + (0.5/0.5)² over 2 entries
        let loss = labeled_loss(&stats, &pred, &labels).unwrap();
        assert!((loss - 0.625).abs() < 1e-14);
        assert!(labeled_loss(&stats, &pred, &DMatrix::zeros(2, 2)).is_err());
    }
}
