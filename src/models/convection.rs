//! Natural convection in a tilted square cavity (Boussinesq, free-fall scaling).
//!
//! Unknowns `p, u, v, T` live on the interior nodes of a tensor Chebyshev grid.
//! Velocity vanishes on the walls, the x-walls carry a fixed temperature taken
//! from the first snapshot, and the y-walls are adiabatic. The design vector is
//! `α = (Ra, Pr, θ)` with the tilt `θ` in degrees.
//!
//! Equations, with `a` the advection coefficient and `b_g` the linear group
//! coefficients `[√(Pr/Ra), 1/√(Pr·Ra), sin θ, cos θ, 1]`:
//!
//! ```text
//! continuity   b4 (u_x + v_y)                                   = 0
//! x-momentum   a (u u_x + v u_y) + b4 p_x − b0 ∇²u − b2 T        = 0
//! y-momentum   a (u v_x + v v_y) + b4 p_y − b0 ∇²v − b3 T        = 0
//! energy       a (u T_x + v T_y) − b1 ∇²T                        = 0
//! ```
//!
//! The Galerkin residual for mode `k` weights them with `p_k`, `u_k`, `v_k`,
//! `T_k` and sums over interior nodes.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::basis::{FlowFields, GridSpec, InteriorLayout, SnapshotSet, Variable};
use crate::discretization::{ChebyshevGrid2d, interior_mask};
use crate::error::{Result, RomError, ensure_len};
use crate::physics::{Coefficients, QuadraticTensor, ReducedOperators};

pub const QUADRATIC_GROUPS: [&str; 1] = ["advection"];
pub const LINEAR_GROUPS: [&str; 5] = [
    "viscous",
    "conductive",
    "buoyancy_sin",
    "buoyancy_cos",
    "pressure_coupling",
];

/// Group multipliers for `α = (Ra, Pr, θ°)`.
pub fn coefficients(alpha: &DVector<f64>) -> Result<Coefficients> {
    ensure_len("natural convection parameters", 3, alpha.len())?;
    let (ra, pr) = (alpha[0], alpha[1]);
    if !(ra > 0.0 && pr > 0.0) {
        return Err(RomError::InvalidDesignSpace(format!(
            "Ra and Pr must be positive, got Ra = {ra}, Pr = {pr}"
        )));
    }
    let theta = alpha[2].to_radians();
    Ok(Coefficients {
        quadratic: vec![1.0],
        linear: vec![
            (pr / ra).sqrt(),
            1.0 / (pr * ra).sqrt(),
            theta.sin(),
            theta.cos(),
            1.0,
        ],
    })
}

/// Pointwise equation residuals on the full grid.
#[derive(Debug, Clone)]
pub struct GridResiduals {
    pub continuity: DMatrix<f64>,
    pub momentum_x: DMatrix<f64>,
    pub momentum_y: DMatrix<f64>,
    pub energy: DMatrix<f64>,
}

impl GridResiduals {
    /// Root mean square of each masked equation over the whole grid, boundary
    /// nodes counting as zero: `[continuity, momentum_x, momentum_y, energy]`.
    pub fn rms(&self, mask: &DMatrix<f64>) -> [f64; 4] {
        let count = mask.len().max(1) as f64;
        let rms = |r: &DMatrix<f64>| (mask.component_mul(&r.component_mul(r)).sum() / count).sqrt();
        [
            rms(&self.continuity),
            rms(&self.momentum_x),
            rms(&self.momentum_y),
            rms(&self.energy),
        ]
    }
}

/// Mode fields and every derivative the tensors need.
struct ModeFields {
    p: DMatrix<f64>,
    u: DMatrix<f64>,
    v: DMatrix<f64>,
    t: DMatrix<f64>,
    u_x: DMatrix<f64>,
    u_y: DMatrix<f64>,
    v_x: DMatrix<f64>,
    v_y: DMatrix<f64>,
    t_x: DMatrix<f64>,
    t_y: DMatrix<f64>,
    p_x: DMatrix<f64>,
    p_y: DMatrix<f64>,
    lap_u: DMatrix<f64>,
    lap_v: DMatrix<f64>,
    lap_t: DMatrix<f64>,
}

#[derive(Debug, Clone)]
pub struct NaturalConvection {
    grid: ChebyshevGrid2d,
    layout: InteriorLayout,
    mask: DMatrix<f64>,
    boundary_temperature: DMatrix<f64>,
}

impl NaturalConvection {
    /// `boundary_temperature` is kept on the two x-walls only.
    pub fn new(grid: ChebyshevGrid2d, boundary_temperature: &DMatrix<f64>) -> Result<Self> {
        let layout = InteriorLayout::new(&grid)?;
        let (nx, ny) = grid.shape();
        ensure_len("boundary temperature rows", nx, boundary_temperature.nrows())?;
        ensure_len("boundary temperature columns", ny, boundary_temperature.ncols())?;
        let tbc = DMatrix::from_fn(nx, ny, |i, j| {
            if i == 0 || i + 1 == nx {
                boundary_temperature[(i, j)]
            } else {
                0.0
            }
        });
        Ok(Self {
            mask: interior_mask((nx, ny)),
            grid,
            layout,
            boundary_temperature: tbc,
        })
    }

    /// Grid from the snapshot field shape on `[−1, 1]²`, wall temperature from
    /// the first snapshot.
    pub fn from_snapshots(snapshots: &SnapshotSet, x_coef: f64, y_coef: f64) -> Result<Self> {
        let GridSpec::Tensor { shape: (nx, ny) } = snapshots.grid else {
            return Err(RomError::InvalidConfig {
                key: "FieldShape",
                reason: "natural convection needs a 2D tensor grid".into(),
            });
        };
        if nx < 3 || ny < 3 {
            return Err(RomError::InvalidConfig {
                key: "FieldShape",
                reason: format!("need at least 3 nodes per axis, got ({nx}, {ny})"),
            });
        }
        let grid = ChebyshevGrid2d::new(nx - 1, ny - 1, (-1.0, 1.0), (-1.0, 1.0))?
            .with_scaling(x_coef, y_coef);
        let layout = InteriorLayout::new(&grid)?;
        let first = snapshots.samples.column(0).into_owned();
        let t0 = layout.loaded_field(&first, Variable::Temperature.offset())?;
        Self::new(grid, &t0)
    }

    pub fn grid(&self) -> &ChebyshevGrid2d {
        &self.grid
    }

    pub fn layout(&self) -> &InteriorLayout {
        &self.layout
    }

    pub fn mask(&self) -> &DMatrix<f64> {
        &self.mask
    }

    pub fn boundary_temperature(&self) -> &DMatrix<f64> {
        &self.boundary_temperature
    }

    /// Snapshot matrix restricted to the interior unknowns.
    pub fn training_matrix(&self, snapshots: &SnapshotSet) -> Result<DMatrix<f64>> {
        self.layout.extract_interior(&snapshots.samples)
    }

    /// Physical fields of an interior vector, wall temperature included.
    pub fn full_fields(&self, vec: &DVector<f64>) -> Result<FlowFields> {
        let mut fields = self.layout.to_fields(vec)?;
        fields.t += &self.boundary_temperature;
        Ok(fields)
    }

    /// Fields stored in a raw snapshot column.
    pub fn snapshot_fields(&self, column: &DVector<f64>) -> Result<FlowFields> {
        let field = |var: Variable| self.layout.loaded_field(column, var.offset());
        Ok(FlowFields {
            p: field(Variable::Pressure)?,
            u: field(Variable::VelocityU)?,
            v: field(Variable::VelocityV)?,
            t: field(Variable::Temperature)?,
        })
    }

    /// Interior RMS of each equation for a raw snapshot at its own design
    /// point. Large values mean the snapshot does not solve this discretization.
    pub fn snapshot_rms(&self, column: &DVector<f64>, coeffs: &Coefficients) -> Result<[f64; 4]> {
        let fields = self.snapshot_fields(column)?;
        Ok(self.grid_residuals(&fields, coeffs).rms(&self.mask))
    }

    pub fn grid_residuals(&self, f: &FlowFields, coeffs: &Coefficients) -> GridResiduals {
        let g = &self.grid;
        let a = coeffs.quadratic[0];
        let b = &coeffs.linear;
        let (u_x, u_y) = g.gradient(&f.u);
        let (v_x, v_y) = g.gradient(&f.v);
        let (t_x, t_y) = g.gradient(&f.t);
        let (p_x, p_y) = g.pressure_gradient(&f.p);
        let advect = |dx: &DMatrix<f64>, dy: &DMatrix<f64>| {
            (f.u.component_mul(dx) + f.v.component_mul(dy)) * a
        };

        GridResiduals {
            continuity: (&u_x + &v_y) * b[4],
            momentum_x: advect(&u_x, &u_y) + p_x * b[4] - g.laplacian(&f.u) * b[0] - &f.t * b[2],
            momentum_y: advect(&v_x, &v_y) + p_y * b[4] - g.laplacian(&f.v) * b[0] - &f.t * b[3],
            energy: advect(&t_x, &t_y) - g.laplacian(&f.t) * b[1],
        }
    }

    /// Galerkin projection of grid residuals onto interior modes.
    pub fn project_residuals(&self, res: &GridResiduals, modes: &DMatrix<f64>) -> Result<DVector<f64>> {
        ensure_len("mode rows", self.layout.interior_len(), modes.nrows())?;
        let mut out = DVector::zeros(modes.ncols());
        for k in 0..modes.ncols() {
            let mk = self.layout.to_fields(&modes.column(k).into_owned())?;
            out[k] = self.weighted(&res.momentum_x, &mk.u)
                + self.weighted(&res.momentum_y, &mk.v)
                + self.weighted(&res.energy, &mk.t)
                + self.weighted(&res.continuity, &mk.p);
        }
        Ok(out)
    }

    /// Reduced tensors for interior `modes` (`interior_len × M`).
    pub fn assemble(&self, modes: &DMatrix<f64>) -> Result<ReducedOperators> {
        ensure_len("mode rows", self.layout.interior_len(), modes.nrows())?;
        let m = modes.ncols();
        let fields = (0..m)
            .map(|j| self.mode_fields(&modes.column(j).into_owned()))
            .collect::<Result<Vec<_>>>()?;

        let g = &self.grid;
        let (tbc_x, tbc_y) = g.gradient(&self.boundary_temperature);
        let tbc_lap = g.laplacian(&self.boundary_temperature);

        let mut a = vec![DMatrix::zeros(m, m); m];
        let mut abc = DMatrix::zeros(m, m);
        for (i, fi) in fields.iter().enumerate() {
            for (j, fj) in fields.iter().enumerate() {
                let adv_u = fi.u.component_mul(&fj.u_x) + fi.v.component_mul(&fj.u_y);
                let adv_v = fi.u.component_mul(&fj.v_x) + fi.v.component_mul(&fj.v_y);
                let adv_t = fi.u.component_mul(&fj.t_x) + fi.v.component_mul(&fj.t_y);
                for (k, fk) in fields.iter().enumerate() {
                    a[k][(i, j)] = self.weighted(&adv_u, &fk.u)
                        + self.weighted(&adv_v, &fk.v)
                        + self.weighted(&adv_t, &fk.t);
                }
            }
            let adv_tbc = fi.u.component_mul(&tbc_x) + fi.v.component_mul(&tbc_y);
            for (k, fk) in fields.iter().enumerate() {
                abc[(k, i)] = self.weighted(&adv_tbc, &fk.t);
            }
        }

        let mut linear = vec![DMatrix::zeros(m, m); LINEAR_GROUPS.len()];
        let mut linear_bc = vec![DVector::zeros(m); LINEAR_GROUPS.len()];
        for (k, fk) in fields.iter().enumerate() {
            for (j, fj) in fields.iter().enumerate() {
                linear[0][(k, j)] = -self.weighted(&fj.lap_u, &fk.u) - self.weighted(&fj.lap_v, &fk.v);
                linear[1][(k, j)] = -self.weighted(&fj.lap_t, &fk.t);
                linear[2][(k, j)] = -self.weighted(&fj.t, &fk.u);
                linear[3][(k, j)] = -self.weighted(&fj.t, &fk.v);
                linear[4][(k, j)] = self.weighted(&(&fj.u_x + &fj.v_y), &fk.p)
                    + self.weighted(&fj.p_x, &fk.u)
                    + self.weighted(&fj.p_y, &fk.v);
            }
            linear_bc[1][k] = -self.weighted(&tbc_lap, &fk.t);
        }

        debug!("Assembled natural convection operators for {m} modes");
        Ok(ReducedOperators {
            quadratic: vec![QuadraticTensor::from_slices(a)?],
            quadratic_bc: vec![abc],
            linear,
            linear_bc,
        })
    }

    fn weighted(&self, f: &DMatrix<f64>, g: &DMatrix<f64>) -> f64 {
        self.mask.component_mul(f).dot(g)
    }

    fn mode_fields(&self, mode: &DVector<f64>) -> Result<ModeFields> {
        let FlowFields { p, u, v, t } = self.layout.to_fields(mode)?;
        let g = &self.grid;
        let (u_x, u_y) = g.gradient(&u);
        let (v_x, v_y) = g.gradient(&v);
        let (t_x, t_y) = g.gradient(&t);
        let (p_x, p_y) = g.pressure_gradient(&p);
        Ok(ModeFields {
            lap_u: g.laplacian(&u),
            lap_v: g.laplacian(&v),
            lap_t: g.laplacian(&t),
            p,
            u,
            v,
            t,
            u_x,
            u_y,
            v_x,
            v_y,
            t_x,
            t_y,
            p_x,
            p_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cavity(n: usize) -> NaturalConvection {
        let grid = ChebyshevGrid2d::new(n, n, (-1.0, 1.0), (-1.0, 1.0))
            .unwrap()
            .with_scaling(0.5, 0.5);
        let (nx, ny) = grid.shape();
        let wall = DMatrix::from_fn(nx, ny, |i, j| {
            let y = grid.y_axis().nodes()[j];
            if i == 0 { 0.5 + 0.1 * y } else { -0.5 }
        });
        NaturalConvection::new(grid, &wall).unwrap()
    }

    fn pseudo_modes(len: usize, m: usize) -> DMatrix<f64> {
        DMatrix::from_fn(len, m, |r, k| (((r * 37 + k * 101) % 53) as f64 / 53.0 - 0.5) * 0.2)
    }

    #[test]
    fn coefficient_groups_follow_parameters() {
        let c = coefficients(&DVector::from_vec(vec![1.0e4, 0.7, 90.0])).unwrap();
        assert!((c.linear[0] - (0.7f64 / 1.0e4).sqrt()).abs() < 1e-15);
        assert!((c.linear[1] - 1.0 / (0.7f64 * 1.0e4).sqrt()).abs() < 1e-15);
        assert!((c.linear[2] - 1.0).abs() < 1e-15);
        assert!(c.linear[3].abs() < 1e-15);
        assert_eq!(c.linear[4], 1.0);
        assert!(coefficients(&DVector::from_vec(vec![-1.0, 0.7, 0.0])).is_err());
    }

    #[test]
    fn boundary_temperature_is_restricted_to_x_walls() {
        let model = cavity(5);
        let tbc = model.boundary_temperature();
        assert_eq!(tbc[(2, 0)], 0.0);
        assert_eq!(tbc[(5, 3)], -0.5);
        assert!(tbc[(0, 0)] != 0.0);
    }

    #[test]
    fn conduction_snapshot_leaves_only_buoyancy() {
        let model = cavity(6);
        let (nx, ny) = model.grid().shape();
        let xs = model.grid().x_axis().nodes().clone();
        let layout = model.layout();
        let mut column = DVector::zeros(layout.loaded_len());
        for i in 0..nx {
            for j in 0..ny {
                column[layout.loaded_index(i, j, Variable::Temperature.offset())] = -0.5 * xs[i];
            }
        }

        let coeffs = coefficients(&DVector::from_vec(vec![1.0e4, 0.7, 90.0])).unwrap();
        let [continuity, mom_x, mom_y, energy] = model.snapshot_rms(&column, &coeffs).unwrap();
        assert_eq!(continuity, 0.0);
        assert!(energy < 1e-10, "linear temperature is harmonic, got {energy:e}");
        assert!(mom_y < 1e-12);

        let t = model.snapshot_fields(&column).unwrap().t;
        // interior buoyancy averaged over all nx * ny nodes
        let expected = (model.mask().component_mul(&t.component_mul(&t)).sum() / (nx * ny) as f64).sqrt();
        assert!((mom_x - expected).abs() < 1e-12);
        assert!(mom_x > 0.0);
    }

    #[test]
    fn reduced_residual_equals_projected_grid_residual() {
        let model = cavity(6);
        let m = 3;
        let modes = pseudo_modes(model.layout().interior_len(), m);
        let ops = model.assemble(&modes).unwrap();
        ops.validate().unwrap();

        let coeffs = coefficients(&DVector::from_vec(vec![2.0e4, 0.71, 30.0])).unwrap();
        let system = ops.evaluate(&coeffs, None).unwrap();
        let lambda = DVector::from_vec(vec![0.8, -1.3, 0.45]);

        let fields = model.full_fields(&(&modes * &lambda)).unwrap();
        let grid_res = model.grid_residuals(&fields, &coeffs);
        let projected = model.project_residuals(&grid_res, &modes).unwrap();
        let reduced = system.residual(&lambda);

        let scale = projected.amax().max(1.0);
        assert!(
            (reduced - &projected).amax() < 1e-10 * scale,
            "reduced and projected residuals differ"
        );
    }
}
