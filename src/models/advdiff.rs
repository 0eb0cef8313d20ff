use nalgebra::DMatrix;

use crate::discretization::{ChebyshevGrid, end_rows, with_dirichlet_rows};
use crate::error::{Result, ensure_len};
use crate::physics::{QuadraticTensor, ReducedOperators};

/// `V D − a D²` with Dirichlet rows at both ends.
pub fn linear_operator(grid: &ChebyshevGrid, velocity: f64, diffusivity: f64) -> DMatrix<f64> {
    let op = grid.differentiation_matrix(1) * velocity - grid.differentiation_matrix(2) * diffusivity;
    with_dirichlet_rows(op, &end_rows(grid.len()))
}

/// Linear problem: the quadratic group is identically zero and
/// `B = Φᵗ (V D − a D²)_bc Φ`.
pub fn assemble(
    grid: &ChebyshevGrid,
    modes: &DMatrix<f64>,
    velocity: f64,
    diffusivity: f64,
) -> Result<ReducedOperators> {
    ensure_len("mode rows", grid.len(), modes.nrows())?;
    let op = linear_operator(grid, velocity, diffusivity);
    let b = modes.tr_mul(&(op * modes));
    Ok(ReducedOperators::single(QuadraticTensor::zeros(modes.ncols()), b))
}
