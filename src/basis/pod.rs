use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RomError, ensure_len};

/// Leading left singular vectors of a snapshot matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodBasis {
    /// `Ndof × M`, orthonormal columns.
    pub modes: DMatrix<f64>,
    /// All singular values of the snapshot matrix, descending.
    pub singular_values: DVector<f64>,
}

/// Thin SVD of `matrix` truncated to `m` modes.
pub fn compute_basis(matrix: &DMatrix<f64>, m: usize) -> Result<PodBasis> {
    let available = matrix.nrows().min(matrix.ncols());
    if m == 0 {
        return Err(RomError::InvalidConfig {
            key: "modes",
            reason: "at least one POD mode is required".into(),
        });
    }
    if m > available {
        return Err(RomError::RankTooLarge {
            requested: m,
            available,
        });
    }

    let svd = matrix.clone().svd(true, false);
    let u = svd.u.ok_or_else(|| RomError::InvalidConfig {
        key: "modes",
        reason: "SVD did not produce left singular vectors".into(),
    })?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    let singular_values = DVector::from_iterator(order.len(), order.iter().map(|&k| svd.singular_values[k]));
    let mut modes = DMatrix::zeros(matrix.nrows(), m);
    for (dst, &src) in order.iter().take(m).enumerate() {
        modes.set_column(dst, &u.column(src));
    }

    debug!(
        "POD basis: {} of {} modes kept, leading singular values {:?}",
        m,
        available,
        singular_values.iter().take(m).collect::<Vec<_>>()
    );
    Ok(PodBasis {
        modes,
        singular_values,
    })
}

/// Coefficients `Φᵗ S`, one column per snapshot.
pub fn project(matrix: &DMatrix<f64>, modes: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    ensure_len("projection rows", modes.nrows(), matrix.nrows())?;
    Ok(modes.tr_mul(matrix))
}

impl PodBasis {
    pub fn num_modes(&self) -> usize {
        self.modes.ncols()
    }

    pub fn dof(&self) -> usize {
        self.modes.nrows()
    }

    pub fn project(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        project(matrix, &self.modes)
    }

    pub fn project_vector(&self, field: &DVector<f64>) -> Result<DVector<f64>> {
        ensure_len("projected field", self.dof(), field.len())?;
        Ok(self.modes.tr_mul(field))
    }

    pub fn reconstruct(&self, lambda: &DVector<f64>) -> Result<DVector<f64>> {
        ensure_len("coefficient vector", self.num_modes(), lambda.len())?;
        Ok(&self.modes * lambda)
    }

    /// Fields for a coefficient matrix with one column per case.
    pub fn reconstruct_many(&self, lambdas: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        ensure_len("coefficient rows", self.num_modes(), lambdas.nrows())?;
        Ok(&self.modes * lambdas)
    }

    /// Share of snapshot energy `Σσ²` captured by the first `m` modes.
    pub fn energy_fraction(&self, m: usize) -> f64 {
        let total: f64 = self.singular_values.iter().map(|s| s * s).sum();
        if total == 0.0 {
            return 1.0;
        }
        let kept: f64 = self.singular_values.iter().take(m).map(|s| s * s).sum();
        kept / total
    }

    /// Smallest mode count whose energy fraction reaches `threshold`.
    pub fn rank_for_energy(&self, threshold: f64) -> usize {
        (1..=self.singular_values.len())
            .find(|&m| self.energy_fraction(m) >= threshold)
            .unwrap_or(self.singular_values.len())
    }
}

/// Per-mode mean and population standard deviation of projection coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub mean: DVector<f64>,
    pub std: DVector<f64>,
}

impl NormalizationStats {
    /// `coefficients` is `M × NSample`. A vanishing deviation is replaced by one.
    pub fn from_coefficients(coefficients: &DMatrix<f64>) -> Result<Self> {
        let n = coefficients.ncols();
        if n == 0 {
            return Err(RomError::SampleCountMismatch {
                what: "normalization statistics",
                left: 0,
                right: 1,
            });
        }
        let mean = coefficients.column_mean();
        let std = DVector::from_fn(coefficients.nrows(), |k, _| {
            let var = coefficients
                .row(k)
                .iter()
                .map(|c| (c - mean[k]).powi(2))
                .sum::<f64>()
                / n as f64;
            let sd = var.sqrt();
            if sd > 0.0 { sd } else { 1.0 }
        });
        Ok(Self { mean, std })
    }

    pub fn normalize(&self, lambda: &DVector<f64>) -> DVector<f64> {
        (lambda - &self.mean).component_div(&self.std)
    }

    pub fn denormalize(&self, scaled: &DVector<f64>) -> DVector<f64> {
        scaled.component_mul(&self.std) + &self.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshots() -> DMatrix<f64> {
        DMatrix::from_fn(7, 4, |i, j| {
            let x = i as f64 / 6.0;
            (1.0 + j as f64) * x + (j as f64).powi(2) * x * x - 0.3 * j as f64
        })
    }

    #[test]
    fn singular_values_do_not_increase() {
        let basis = compute_basis(&snapshots(), 3).unwrap();
        for w in basis.singular_values.as_slice().windows(2) {
            assert!(w[0] >= w[1], "{} < {}", w[0], w[1]);
        }
        let gram = basis.modes.tr_mul(&basis.modes);
        assert!((gram - DMatrix::identity(3, 3)).amax() < 1e-12);
    }

    #[test]
    fn full_rank_projection_round_trips() {
        let s = snapshots();
        let basis = compute_basis(&s, 3).unwrap();
        // the family spans {1, x, x²}, so three modes are exact
        let back = basis.reconstruct_many(&basis.project(&s).unwrap()).unwrap();
        assert!((back - &s).amax() < 1e-12);
        assert!(basis.energy_fraction(3) > 1.0 - 1e-14);
        assert!(basis.rank_for_energy(0.999_999) <= 3);
        assert_eq!(basis.rank_for_energy(0.0), 1);
    }

    #[test]
    fn too_many_modes_is_rejected() {
        match compute_basis(&snapshots(), 5) {
            Err(RomError::RankTooLarge {
                requested,
                available,
            }) => assert_eq!((requested, available), (5, 4)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn normalization_guards_constant_modes() {
        let coeffs = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 5.0, 5.0, 5.0]);
        let stats = NormalizationStats::from_coefficients(&coeffs).unwrap();
        assert!((stats.std[0] - (2.0f64 / 3.0).sqrt()).abs() < 1e-15);
        assert_eq!(stats.std[1], 1.0);

        let lambda = DVector::from_vec(vec![2.5, 4.0]);
        let scaled = stats.normalize(&lambda);
        assert_eq!(scaled[1], -1.0);
        assert!((stats.denormalize(&scaled) - lambda).amax() < 1e-15);
    }
}
