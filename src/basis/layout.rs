//! Degree-of-freedom layout of the 2D natural-convection snapshots.
//!
//! Raw snapshots interleave [`LOADED_VARS`] variables per grid point
//! (`p, u, v, T, ω, ψ`) over the full `(nx, ny)` grid in row-major point order:
//! row `(i * ny + j) * LOADED_VARS + var`.
//!
//! The reduced basis only sees the first [`SOLVED_VARS`] variables on interior
//! points: row `(ii * (ny - 2) + jj) * SOLVED_VARS + var` with `ii = i - 1`,
//! `jj = j - 1`. Boundary values are either zero (velocity, pressure), carried by
//! a fixed boundary temperature, or recovered from the adiabatic wall closure.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::discretization::ChebyshevGrid2d;
use crate::error::{Result, RomError, ensure_len};

pub const LOADED_VARS: usize = 6;
pub const SOLVED_VARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Pressure = 0,
    VelocityU = 1,
    VelocityV = 2,
    Temperature = 3,
}

impl Variable {
    pub const ALL: [Variable; SOLVED_VARS] = [
        Variable::Pressure,
        Variable::VelocityU,
        Variable::VelocityV,
        Variable::Temperature,
    ];

    pub fn offset(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Variable::Pressure => "p",
            Variable::VelocityU => "u",
            Variable::VelocityV => "v",
            Variable::Temperature => "T",
        }
    }
}

/// Full-grid fields reconstructed from an interior vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowFields {
    pub p: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub v: DMatrix<f64>,
    pub t: DMatrix<f64>,
}

#[derive(Debug, Clone)]
pub struct InteriorLayout {
    shape: (usize, usize),
    /// Inverse of the 2×2 corner block of `D_y`, solving `∂T/∂y = 0` on both y-walls.
    wall_inverse: Matrix2<f64>,
    /// Rows 0 and `ny - 1` of `D_y`.
    wall_rows: DMatrix<f64>,
}

impl InteriorLayout {
    pub fn new(grid: &ChebyshevGrid2d) -> Result<Self> {
        let shape = grid.shape();
        if shape.0 < 3 || shape.1 < 3 {
            return Err(RomError::InvalidConfig {
                key: "FieldShape",
                reason: format!("need at least 3 nodes per axis, got {shape:?}"),
            });
        }

        let dy = grid.dy_matrix();
        let last = shape.1 - 1;
        let corner = Matrix2::new(dy[(0, 0)], dy[(0, last)], dy[(last, 0)], dy[(last, last)]);
        let wall_inverse = corner.try_inverse().ok_or_else(|| RomError::InvalidConfig {
            key: "FieldShape",
            reason: "adiabatic wall closure is singular".into(),
        })?;
        let wall_rows = DMatrix::from_fn(2, shape.1, |r, j| dy[(if r == 0 { 0 } else { last }, j)]);

        Ok(Self {
            shape,
            wall_inverse,
            wall_rows,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn interior_shape(&self) -> (usize, usize) {
        (self.shape.0 - 2, self.shape.1 - 2)
    }

    pub fn interior_len(&self) -> usize {
        let (ni, nj) = self.interior_shape();
        ni * nj * SOLVED_VARS
    }

    pub fn loaded_len(&self) -> usize {
        self.shape.0 * self.shape.1 * LOADED_VARS
    }

    pub fn loaded_index(&self, i: usize, j: usize, var: usize) -> usize {
        (i * self.shape.1 + j) * LOADED_VARS + var
    }

    pub fn interior_index(&self, ii: usize, jj: usize, var: Variable) -> usize {
        (ii * (self.shape.1 - 2) + jj) * SOLVED_VARS + var.offset()
    }

    /// Restrict raw snapshots (one per column) to interior `p, u, v, T` rows.
    pub fn extract_interior(&self, samples: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        ensure_len("raw snapshot rows", self.loaded_len(), samples.nrows())?;
        let (ni, nj) = self.interior_shape();
        let mut out = DMatrix::zeros(self.interior_len(), samples.ncols());
        for s in 0..samples.ncols() {
            for ii in 0..ni {
                for jj in 0..nj {
                    for var in Variable::ALL {
                        let src = self.loaded_index(ii + 1, jj + 1, var.offset());
                        out[(self.interior_index(ii, jj, var), s)] = samples[(src, s)];
                    }
                }
            }
        }
        Ok(out)
    }

    /// One loaded variable of a raw snapshot column as a full field.
    pub fn loaded_field(&self, column: &DVector<f64>, var: usize) -> Result<DMatrix<f64>> {
        ensure_len("raw snapshot length", self.loaded_len(), column.len())?;
        let (nx, ny) = self.shape;
        Ok(DMatrix::from_fn(nx, ny, |i, j| column[self.loaded_index(i, j, var)]))
    }

    /// Scatter an interior vector into full fields. Velocity and pressure vanish on
    /// the boundary; temperature on the y-walls satisfies `∂T/∂y = 0`.
    pub fn to_fields(&self, vec: &DVector<f64>) -> Result<FlowFields> {
        ensure_len("interior vector", self.interior_len(), vec.len())?;
        let (nx, ny) = self.shape;
        let (ni, nj) = self.interior_shape();
        let field = |var: Variable| {
            let mut f = DMatrix::zeros(nx, ny);
            for ii in 0..ni {
                for jj in 0..nj {
                    f[(ii + 1, jj + 1)] = vec[self.interior_index(ii, jj, var)];
                }
            }
            f
        };

        let mut t = field(Variable::Temperature);
        self.close_adiabatic_walls(&mut t);

        Ok(FlowFields {
            p: field(Variable::Pressure),
            u: field(Variable::VelocityU),
            v: field(Variable::VelocityV),
            t,
        })
    }

    /// Gather the interior `p, u, v, T` values of full fields.
    pub fn to_interior(&self, fields: &FlowFields) -> DVector<f64> {
        let (ni, nj) = self.interior_shape();
        let mut out = DVector::zeros(self.interior_len());
        for ii in 0..ni {
            for jj in 0..nj {
                let (i, j) = (ii + 1, jj + 1);
                out[self.interior_index(ii, jj, Variable::Pressure)] = fields.p[(i, j)];
                out[self.interior_index(ii, jj, Variable::VelocityU)] = fields.u[(i, j)];
                out[self.interior_index(ii, jj, Variable::VelocityV)] = fields.v[(i, j)];
                out[self.interior_index(ii, jj, Variable::Temperature)] = fields.t[(i, j)];
            }
        }
        out
    }

    fn close_adiabatic_walls(&self, t: &mut DMatrix<f64>) {
        let (nx, ny) = self.shape;
        for i in 1..nx - 1 {
            let mut rhs = Vector2::zeros();
            for j in 1..ny - 1 {
                rhs[0] -= self.wall_rows[(0, j)] * t[(i, j)];
                rhs[1] -= self.wall_rows[(1, j)] * t[(i, j)];
            }
            let walls = self.wall_inverse * rhs;
            t[(i, 0)] = walls[0];
            t[(i, ny - 1)] = walls[1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(n: usize) -> (ChebyshevGrid2d, InteriorLayout) {
        let grid = ChebyshevGrid2d::new(n, n, (-1.0, 1.0), (-1.0, 1.0)).unwrap();
        let layout = InteriorLayout::new(&grid).unwrap();
        (grid, layout)
    }

    #[test]
    fn extraction_keeps_interior_solved_variables() {
        let (_, layout) = layout(4);
        let raw = DMatrix::from_fn(layout.loaded_len(), 2, |r, s| (r + 1000 * s) as f64);
        let inner = layout.extract_interior(&raw).unwrap();
        assert_eq!(inner.nrows(), 3 * 3 * SOLVED_VARS);

        let row = layout.interior_index(1, 2, Variable::VelocityV);
        let src = layout.loaded_index(2, 3, Variable::VelocityV.offset());
        assert_eq!(inner[(row, 1)], (src + 1000) as f64);
    }

    #[test]
    fn extraction_rejects_wrong_stride() {
        let (_, layout) = layout(4);
        let raw = DMatrix::zeros(layout.loaded_len() - 1, 1);
        assert!(matches!(
            layout.extract_interior(&raw),
            Err(RomError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn scattered_temperature_is_adiabatic_on_y_walls() {
        let (grid, layout) = layout(6);
        let vec = DVector::from_fn(layout.interior_len(), |k, _| ((k * 7) % 11) as f64 * 0.1);
        let fields = layout.to_fields(&vec).unwrap();
        let ty = grid.d_dy(&fields.t);
        for i in 1..6 {
            assert!(ty[(i, 0)].abs() < 1e-10, "row {i}: {}", ty[(i, 0)]);
            assert!(ty[(i, 6)].abs() < 1e-10, "row {i}: {}", ty[(i, 6)]);
        }
        assert_eq!(fields.u[(0, 3)], 0.0);
        assert!((layout.to_interior(&fields) - vec).amax() < 1e-15);
    }
}
