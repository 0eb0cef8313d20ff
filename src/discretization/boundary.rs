use nalgebra::DMatrix;

/// Turn the given rows of a collocation operator into Dirichlet equations:
/// the row is cleared and its diagonal entry set to one, so the projected
/// operator enforces `u[row] = rhs[row]` directly.
pub fn impose_dirichlet_rows(op: &mut DMatrix<f64>, rows: &[usize]) {
    for &r in rows {
        op.row_mut(r).fill(0.0);
        op[(r, r)] = 1.0;
    }
}

/// Owned variant of [`impose_dirichlet_rows`].
pub fn with_dirichlet_rows(mut op: DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    impose_dirichlet_rows(&mut op, rows);
    op
}

/// The two end nodes of a 1D grid with `n` nodes.
pub fn end_rows(n: usize) -> [usize; 2] {
    [0, n.saturating_sub(1)]
}

/// Weight field equal to one on interior nodes and zero on the boundary ring.
pub fn interior_mask(shape: (usize, usize)) -> DMatrix<f64> {
    let (nx, ny) = shape;
    DMatrix::from_fn(nx, ny, |i, j| {
        let interior = i > 0 && i + 1 < nx && j > 0 && j + 1 < ny;
        if interior { 1.0 } else { 0.0 }
    })
}
