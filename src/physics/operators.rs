use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use serde::{Deserialize, Serialize};

use super::ReducedModel;
use crate::error::{Result, RomError, ensure_len};

/// Rank-3 tensor stored as `M` slices `A_k ∈ ℝ^{M×M}`.
///
/// Component `k` of the quadratic term is `λᵗ A_k λ`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticTensor {
    slices: Vec<DMatrix<f64>>,
}

impl QuadraticTensor {
    pub fn zeros(m: usize) -> Self {
        Self {
            slices: vec![DMatrix::zeros(m, m); m],
        }
    }

    pub fn from_fn(m: usize, f: impl Fn(usize, usize, usize) -> f64) -> Self {
        Self {
            slices: (0..m)
                .map(|k| DMatrix::from_fn(m, m, |i, j| f(k, i, j)))
                .collect(),
        }
    }

    pub fn from_slices(slices: Vec<DMatrix<f64>>) -> Result<Self> {
        let m = slices.len();
        for s in &slices {
            ensure_len("quadratic slice rows", m, s.nrows())?;
            ensure_len("quadratic slice columns", m, s.ncols())?;
        }
        Ok(Self { slices })
    }

    pub fn dim(&self) -> usize {
        self.slices.len()
    }

    pub fn slice(&self, k: usize) -> &DMatrix<f64> {
        &self.slices[k]
    }

    pub fn slices(&self) -> &[DMatrix<f64>] {
        &self.slices
    }

    /// `self += c * other`.
    pub fn add_scaled(&mut self, c: f64, other: &QuadraticTensor) {
        for (mine, theirs) in self.slices.iter_mut().zip(&other.slices) {
            *mine += theirs * c;
        }
    }

    /// Vector of `λᵗ A_k λ` for every `k`.
    pub fn contract(&self, lambda: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.dim(), self.slices.iter().map(|a| lambda.dot(&(a * lambda))))
    }

    /// Jacobian of [`contract`](Self::contract): row `k` is `(A_k + A_kᵗ) λ`.
    pub fn jacobian(&self, lambda: &DVector<f64>) -> DMatrix<f64> {
        let m = self.dim();
        let mut jac = DMatrix::zeros(m, m);
        for (k, a) in self.slices.iter().enumerate() {
            let row = a * lambda + a.tr_mul(lambda);
            jac.set_row(k, &row.transpose());
        }
        jac
    }
}

/// Scalar multipliers for each named coefficient group.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    pub quadratic: Vec<f64>,
    pub linear: Vec<f64>,
}

/// Parameter-independent reduced tensors, one entry per coefficient group.
///
/// `quadratic_bc[g]` is the part of quadratic group `g` that becomes linear once
/// one factor is a fixed boundary field. `linear_bc[g]` is the boundary data
/// pushed through linear group `g`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedOperators {
    pub quadratic: Vec<QuadraticTensor>,
    pub quadratic_bc: Vec<DMatrix<f64>>,
    pub linear: Vec<DMatrix<f64>>,
    pub linear_bc: Vec<DVector<f64>>,
}

impl ReducedOperators {
    /// One quadratic and one linear group without boundary corrections.
    pub fn single(quadratic: QuadraticTensor, linear: DMatrix<f64>) -> Self {
        let m = quadratic.dim();
        Self {
            quadratic: vec![quadratic],
            quadratic_bc: vec![DMatrix::zeros(m, m)],
            linear: vec![linear],
            linear_bc: vec![DVector::zeros(m)],
        }
    }

    pub fn num_modes(&self) -> usize {
        self.linear.first().map_or(0, |b| b.nrows())
    }

    pub fn group_counts(&self) -> (usize, usize) {
        (self.quadratic.len(), self.linear.len())
    }

    /// Check that every tensor has the same mode count and that boundary
    /// corrections pair up with their groups.
    pub fn validate(&self) -> Result<()> {
        let m = self.num_modes();
        ensure_len("quadratic boundary groups", self.quadratic.len(), self.quadratic_bc.len())?;
        ensure_len("linear boundary groups", self.linear.len(), self.linear_bc.len())?;
        for a in &self.quadratic {
            ensure_len("quadratic tensor modes", m, a.dim())?;
        }
        for (b, bc) in self.linear.iter().zip(&self.linear_bc) {
            ensure_len("linear operator rows", m, b.nrows())?;
            ensure_len("linear operator columns", m, b.ncols())?;
            ensure_len("linear boundary correction", m, bc.len())?;
        }
        for abc in &self.quadratic_bc {
            ensure_len("quadratic boundary correction", m, abc.nrows())?;
        }
        Ok(())
    }

    /// Combine the groups for one parameter vector:
    /// `A = Σ a_g A_g`, `B = Σ a_g Abc_g + Σ b_g B_g`,
    /// `source = forcing − Σ b_g Bbc_g`.
    pub fn evaluate(
        &self,
        coeffs: &Coefficients,
        forcing: Option<&DVector<f64>>,
    ) -> Result<ReducedSystem> {
        ensure_len("quadratic coefficients", self.quadratic.len(), coeffs.quadratic.len())?;
        ensure_len("linear coefficients", self.linear.len(), coeffs.linear.len())?;
        let m = self.num_modes();

        let mut a = QuadraticTensor::zeros(m);
        let mut b = DMatrix::zeros(m, m);
        for ((ag, abc), &c) in self.quadratic.iter().zip(&self.quadratic_bc).zip(&coeffs.quadratic) {
            a.add_scaled(c, ag);
            b += abc * c;
        }

        let mut source = match forcing {
            Some(f) => {
                ensure_len("forcing", m, f.len())?;
                f.clone()
            }
            None => DVector::zeros(m),
        };
        for ((bg, bbc), &c) in self.linear.iter().zip(&self.linear_bc).zip(&coeffs.linear) {
            b += bg * c;
            source -= bbc * c;
        }

        Ok(ReducedSystem { a, b, source })
    }
}

/// The quadratic system `λᵗAλ + Bλ − source = 0` for one parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedSystem {
    pub a: QuadraticTensor,
    pub b: DMatrix<f64>,
    pub source: DVector<f64>,
}

impl ReducedSystem {
    pub fn new(a: QuadraticTensor, b: DMatrix<f64>, source: DVector<f64>) -> Result<Self> {
        let m = a.dim();
        ensure_len("linear operator rows", m, b.nrows())?;
        ensure_len("linear operator columns", m, b.ncols())?;
        ensure_len("source", m, source.len())?;
        Ok(Self { a, b, source })
    }

    pub fn dim(&self) -> usize {
        self.source.len()
    }

    pub fn residual(&self, lambda: &DVector<f64>) -> DVector<f64> {
        self.a.contract(lambda) + &self.b * lambda - &self.source
    }

    pub fn jacobian(&self, lambda: &DVector<f64>) -> DMatrix<f64> {
        self.a.jacobian(lambda) + &self.b
    }

    /// Residual over any scalar type that behaves like a real number, so forward
    /// mode automatic differentiation can run through it.
    pub fn residual_generic<T>(&self, lambda: &DVector<T>) -> DVector<T>
    where
        T: nalgebra::Scalar + DualNum<f64> + num_traits::Zero,
    {
        let m = self.dim();
        DVector::from_fn(m, |k, _| {
            let a = self.a.slice(k);
            let mut acc = T::zero();
            for i in 0..m {
                let mut row = T::from(self.b[(k, i)]);
                for j in 0..m {
                    row = row + lambda[j].clone() * T::from(a[(i, j)]);
                }
                acc = acc + lambda[i].clone() * row;
            }
            acc - T::from(self.source[k])
        })
    }
}

impl<T> ReducedModel<T> for ReducedSystem
where
    T: nalgebra::Scalar + DualNum<f64> + num_traits::Zero,
{
    fn num_modes(&self) -> usize {
        self.dim()
    }

    fn calculate_residual(&self, lambda: DVector<T>) -> DVector<T> {
        self.residual_generic(&lambda)
    }
}

/// Shape check for operators read back from disk.
pub fn checked(ops: ReducedOperators) -> Result<ReducedOperators> {
    ops.validate()?;
    if ops.num_modes() == 0 {
        return Err(RomError::InvalidConfig {
            key: "modes",
            reason: "reduced operators carry no modes".into(),
        });
    }
    Ok(ops)
}
