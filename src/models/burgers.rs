use nalgebra::DMatrix;

use crate::discretization::{ChebyshevGrid, end_rows, with_dirichlet_rows};
use crate::error::{Result, ensure_len};
use crate::physics::{QuadraticTensor, ReducedOperators};

/// `A_k[i][j] = Σ_n Φ_nk Φ_ni (DΦ)_nj` over interior nodes `n`.
pub fn quadratic_tensor(grid: &ChebyshevGrid, modes: &DMatrix<f64>) -> QuadraticTensor {
    let m = modes.ncols();
    let n = modes.nrows();
    let modes_x = grid.first_derivative() * modes;
    QuadraticTensor::from_fn(m, |k, i, j| {
        (1..n - 1)
            .map(|p| modes[(p, k)] * modes[(p, i)] * modes_x[(p, j)])
            .sum()
    })
}

/// `B = Φᵗ (−a D²)_bc Φ`.
pub fn diffusion_operator(grid: &ChebyshevGrid, modes: &DMatrix<f64>, viscosity: f64) -> DMatrix<f64> {
    let op = with_dirichlet_rows(grid.differentiation_matrix(2) * -viscosity, &end_rows(grid.len()));
    modes.tr_mul(&(op * modes))
}

pub fn assemble(grid: &ChebyshevGrid, modes: &DMatrix<f64>, viscosity: f64) -> Result<ReducedOperators> {
    ensure_len("mode rows", grid.len(), modes.nrows())?;
    Ok(ReducedOperators::single(
        quadratic_tensor(grid, modes),
        diffusion_operator(grid, modes, viscosity),
    ))
}
