use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, RomError};

/// Chebyshev–Gauss–Lobatto nodes on `[lower, upper]`, ascending.
///
/// `order` is the polynomial degree, so `order + 1` nodes are returned and both
/// interval ends are included.
pub fn chebyshev_nodes(order: usize, bounds: (f64, f64)) -> DVector<f64> {
    let (lower, upper) = bounds;
    let n = order as f64;
    DVector::from_iterator(
        order + 1,
        (0..=order).map(|k| {
            let xi = -(PI * k as f64 / n).cos();
            lower + 0.5 * (upper - lower) * (xi + 1.0)
        }),
    )
}

/// Differentiation matrix for polynomial interpolation through arbitrary distinct
/// nodes (barycentric form, negative-sum diagonal).
pub fn collocation_matrix(nodes: &[f64]) -> DMatrix<f64> {
    let n = nodes.len();
    let weights: Vec<f64> = (0..n)
        .map(|j| {
            let prod: f64 = (0..n)
                .filter(|&k| k != j)
                .map(|k| nodes[j] - nodes[k])
                .product();
            1.0 / prod
        })
        .collect();

    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut diag = 0.0;
        for j in 0..n {
            if i != j {
                let v = weights[j] / weights[i] / (nodes[i] - nodes[j]);
                d[(i, j)] = v;
                diag -= v;
            }
        }
        d[(i, i)] = diag;
    }
    d
}

/// One-dimensional Chebyshev collocation grid with its first-derivative operator.
#[derive(Debug, Clone)]
pub struct ChebyshevGrid {
    nodes: DVector<f64>,
    bounds: (f64, f64),
    d1: DMatrix<f64>,
}

impl ChebyshevGrid {
    pub fn new(order: usize, bounds: (f64, f64)) -> Result<Self> {
        if order == 0 {
            return Err(RomError::InvalidConfig {
                key: "order",
                reason: "a Chebyshev grid needs at least two nodes".into(),
            });
        }
        if !(bounds.0 < bounds.1) {
            return Err(RomError::InvalidDesignSpace(format!(
                "grid bounds must satisfy lower < upper, got [{}, {}]",
                bounds.0, bounds.1
            )));
        }

        let nodes = chebyshev_nodes(order, bounds);
        let d1 = first_derivative(order, bounds);
        Ok(Self { nodes, bounds, d1 })
    }

    pub fn order(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &DVector<f64> {
        &self.nodes
    }

    pub fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    /// `D^k`, the matrix of the `k`-th derivative. `k = 0` gives the identity.
    pub fn differentiation_matrix(&self, derivative_order: usize) -> DMatrix<f64> {
        let n = self.len();
        let mut out = DMatrix::identity(n, n);
        for _ in 0..derivative_order {
            out = &self.d1 * out;
        }
        out
    }

    pub fn first_derivative(&self) -> &DMatrix<f64> {
        &self.d1
    }

    /// Derivative operator for pressure-type unknowns that only live on interior
    /// nodes.
    ///
    /// The interior values are interpolated by a polynomial of degree
    /// `order - 2` which is then differentiated at the interior nodes. Rows and
    /// columns of the two end nodes are zero, so boundary values never enter.
    pub fn pressure_matrix(&self) -> DMatrix<f64> {
        let n = self.len();
        let mut out = DMatrix::zeros(n, n);
        if n < 3 {
            return out;
        }
        let interior: Vec<f64> = self.nodes.iter().skip(1).take(n - 2).copied().collect();
        let inner = collocation_matrix(&interior);
        out.view_mut((1, 1), (n - 2, n - 2)).copy_from(&inner);
        out
    }
}

/// Chebyshev first-derivative matrix on ascending Gauss–Lobatto nodes, scaled to
/// the interval.
fn first_derivative(order: usize, bounds: (f64, f64)) -> DMatrix<f64> {
    let n = order + 1;
    let xi: Vec<f64> = (0..n)
        .map(|k| -(PI * k as f64 / order as f64).cos())
        .collect();
    let c: Vec<f64> = (0..n)
        .map(|k| {
            let edge = if k == 0 || k == order { 2.0 } else { 1.0 };
            if k % 2 == 0 { edge } else { -edge }
        })
        .collect();

    let scale = 2.0 / (bounds.1 - bounds.0);
    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut diag = 0.0;
        for j in 0..n {
            if i != j {
                let v = c[i] / c[j] / (xi[i] - xi[j]);
                d[(i, j)] = v * scale;
                diag -= v;
            }
        }
        d[(i, i)] = diag * scale;
    }
    d
}
