use nalgebra::DMatrix;

use super::chebyshev::ChebyshevGrid;
use crate::error::Result;

/// Tensor-product Chebyshev grid. Fields are `(nx, ny)` matrices indexed `(i, j)`
/// with `i` along x and `j` along y.
///
/// Derivatives are taken with respect to physical coordinates `xc = x * x_coef`,
/// `yc = y * y_coef`, so every x-derivative is divided by `x_coef` (likewise for y).
#[derive(Debug, Clone)]
pub struct ChebyshevGrid2d {
    x: ChebyshevGrid,
    y: ChebyshevGrid,
    x_coef: f64,
    y_coef: f64,
    dx: DMatrix<f64>,
    dy_t: DMatrix<f64>,
    dxx: DMatrix<f64>,
    dyy_t: DMatrix<f64>,
    dpx: DMatrix<f64>,
    dpy_t: DMatrix<f64>,
}

impl ChebyshevGrid2d {
    pub fn new(
        order_x: usize,
        order_y: usize,
        bounds_x: (f64, f64),
        bounds_y: (f64, f64),
    ) -> Result<Self> {
        let x = ChebyshevGrid::new(order_x, bounds_x)?;
        let y = ChebyshevGrid::new(order_y, bounds_y)?;
        let dx = x.differentiation_matrix(1);
        let dxx = x.differentiation_matrix(2);
        let dpx = x.pressure_matrix();
        let dy_t = y.differentiation_matrix(1).transpose();
        let dyy_t = y.differentiation_matrix(2).transpose();
        let dpy_t = y.pressure_matrix().transpose();
        Ok(Self {
            x,
            y,
            x_coef: 1.0,
            y_coef: 1.0,
            dx,
            dy_t,
            dxx,
            dyy_t,
            dpx,
            dpy_t,
        })
    }

    pub fn with_scaling(mut self, x_coef: f64, y_coef: f64) -> Self {
        self.x_coef = x_coef;
        self.y_coef = y_coef;
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.x.len(), self.y.len())
    }

    pub fn scaling(&self) -> (f64, f64) {
        (self.x_coef, self.y_coef)
    }

    pub fn x_axis(&self) -> &ChebyshevGrid {
        &self.x
    }

    pub fn y_axis(&self) -> &ChebyshevGrid {
        &self.y
    }

    /// Reference coordinates of every node, as `(xc, yc)` matrices of the field shape.
    pub fn grid(&self) -> (DMatrix<f64>, DMatrix<f64>) {
        let (nx, ny) = self.shape();
        let xs = self.x.nodes();
        let ys = self.y.nodes();
        (
            DMatrix::from_fn(nx, ny, |i, _| xs[i]),
            DMatrix::from_fn(nx, ny, |_, j| ys[j]),
        )
    }

    /// Unscaled first-derivative matrix along y, used for wall closures.
    pub fn dy_matrix(&self) -> DMatrix<f64> {
        self.dy_t.transpose()
    }

    pub fn d_dx(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        (&self.dx * f) / self.x_coef
    }

    pub fn d_dy(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        (f * &self.dy_t) / self.y_coef
    }

    pub fn d2_dx2(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        (&self.dxx * f) / (self.x_coef * self.x_coef)
    }

    pub fn d2_dy2(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        (f * &self.dyy_t) / (self.y_coef * self.y_coef)
    }

    pub fn d2_dxdy(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        self.d_dy(&self.d_dx(f))
    }

    pub fn dp_dx(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        (&self.dpx * f) / self.x_coef
    }

    pub fn dp_dy(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        (f * &self.dpy_t) / self.y_coef
    }

    pub fn gradient(&self, f: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        (self.d_dx(f), self.d_dy(f))
    }

    pub fn pressure_gradient(&self, f: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        (self.dp_dx(f), self.dp_dy(f))
    }

    pub fn laplacian(&self, f: &DMatrix<f64>) -> DMatrix<f64> {
        self.d2_dx2(f) + self.d2_dy2(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(grid: &ChebyshevGrid2d, f: impl Fn(f64, f64) -> f64) -> DMatrix<f64> {
        let (xc, yc) = grid.grid();
        xc.zip_map(&yc, f)
    }

    #[test]
    fn axis_derivatives_of_polynomial() {
        let grid = ChebyshevGrid2d::new(6, 5, (-1.0, 1.0), (-1.0, 1.0)).unwrap();
        let f = sample(&grid, |x, y| x.powi(3) * y * y + y);
        let (fx, fy) = grid.gradient(&f);
        let exact_fx = sample(&grid, |x, y| 3.0 * x * x * y * y);
        let exact_fy = sample(&grid, |x, y| 2.0 * x.powi(3) * y + 1.0);
        assert!((fx - exact_fx).amax() < 1e-11);
        assert!((fy - exact_fy).amax() < 1e-11);

        let fxy = grid.d2_dxdy(&f);
        let exact_fxy = sample(&grid, |x, y| 6.0 * x * x * y);
        assert!((fxy - exact_fxy).amax() < 1e-10);
    }

    #[test]
    fn scaling_divides_derivatives() {
        let grid = ChebyshevGrid2d::new(4, 4, (-1.0, 1.0), (-1.0, 1.0))
            .unwrap()
            .with_scaling(0.5, 0.5);
        let f = sample(&grid, |x, y| x * x + y * y);
        let lap = grid.laplacian(&f);
        for v in lap.iter() {
            assert!((v - 16.0).abs() < 1e-10, "{v}");
        }
    }
}
