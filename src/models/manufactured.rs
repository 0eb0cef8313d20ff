//! Closed-form solution families for the 1D problems.
//!
//! Each family vanishes at `x = ±1`, so snapshots, forcing and exact fields are
//! all available without a high-fidelity solver.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Manufactured {
    /// `φ = sin(−α₂x/3)(1 + α₁x)(x² − 1)`
    #[default]
    SinePolynomial,
    /// `φ = (α₁x + α₂x²)(x² − 1)`, spanned exactly by two modes.
    PolynomialPair,
}

impl Manufactured {
    pub fn value(self, x: f64, alpha: &DVector<f64>) -> f64 {
        self.derivatives(x, alpha).0
    }

    /// `(φ, φ_x, φ_xx)` at `x`.
    pub fn derivatives(self, x: f64, alpha: &DVector<f64>) -> (f64, f64, f64) {
        let (a1, a2) = (alpha[0], alpha[1]);
        match self {
            Manufactured::SinePolynomial => {
                let f1 = (1.0 + a1 * x) * (x * x - 1.0);
                let f1_x = 3.0 * a1 * x * x + 2.0 * x - a1;
                let f1_xx = 6.0 * a1 * x + 2.0;
                let f2 = (-a2 * x / 3.0).sin();
                let f2_x = -a2 / 3.0 * (-a2 * x / 3.0).cos();
                let f2_xx = -a2 * a2 / 9.0 * f2;
                (
                    f1 * f2,
                    f1 * f2_x + f1_x * f2,
                    2.0 * f1_x * f2_x + f1 * f2_xx + f1_xx * f2,
                )
            }
            Manufactured::PolynomialPair => {
                let g = a1 * x + a2 * x * x;
                let g_x = a1 + 2.0 * a2 * x;
                let g_xx = 2.0 * a2;
                let h = x * x - 1.0;
                let h_x = 2.0 * x;
                (g * h, g_x * h + g * h_x, g_xx * h + 2.0 * g_x * h_x + 2.0 * g)
            }
        }
    }

    pub fn field(self, nodes: &DVector<f64>, alpha: &DVector<f64>) -> DVector<f64> {
        nodes.map(|x| self.value(x, alpha))
    }
}

/// Transport term of a scalar 1D equation `T(φ) − a φ_xx = f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transport {
    /// `T(φ) = V φ_x`
    Linear { velocity: f64 },
    /// `T(φ) = φ φ_x`
    Burgers,
}

/// Right-hand side that makes a manufactured family an exact solution,
/// with boundary rows carrying the boundary values.
#[derive(Debug, Clone)]
pub struct ManufacturedForcing {
    nodes: DVector<f64>,
    modes: DMatrix<f64>,
    family: Manufactured,
    transport: Transport,
    diffusivity: f64,
}

impl ManufacturedForcing {
    pub fn new(
        nodes: DVector<f64>,
        modes: DMatrix<f64>,
        family: Manufactured,
        transport: Transport,
        diffusivity: f64,
    ) -> Self {
        Self {
            nodes,
            modes,
            family,
            transport,
            diffusivity,
        }
    }

    pub fn family(&self) -> Manufactured {
        self.family
    }

    pub fn nodes(&self) -> &DVector<f64> {
        &self.nodes
    }

    /// Pointwise forcing on the grid.
    pub fn field(&self, alpha: &DVector<f64>) -> DVector<f64> {
        let n = self.nodes.len();
        DVector::from_fn(n, |p, _| {
            let x = self.nodes[p];
            let (phi, phi_x, phi_xx) = self.family.derivatives(x, alpha);
            if p == 0 || p + 1 == n {
                return phi;
            }
            let transport = match self.transport {
                Transport::Linear { velocity } => velocity * phi_x,
                Transport::Burgers => phi * phi_x,
            };
            transport - self.diffusivity * phi_xx
        })
    }

    /// `Φᵗ f`
    pub fn project(&self, alpha: &DVector<f64>) -> DVector<f64> {
        self.modes.tr_mul(&self.field(alpha))
    }

    pub fn exact(&self, alpha: &DVector<f64>) -> DVector<f64> {
        self.family.field(&self.nodes, alpha)
    }
}
