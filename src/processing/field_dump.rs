use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::basis::FlowFields;
use crate::discretization::{ChebyshevGrid2d, interior_mask};
use crate::error::{Result, ensure_len};
use crate::models::NaturalConvection;

/// Vorticity `ω = u_y − v_x` and the streamfunction `∇²ψ = ω`, `ψ = 0` on the
/// walls, found by explicit pseudo-time relaxation.
#[derive(Debug, Clone)]
pub struct VorticityStreamfunction {
    /// Stop once the largest interior update rate drops below this.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Progress is logged every this many iterations.
    pub log_every: usize,
}

impl Default for VorticityStreamfunction {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100_000_000,
            log_every: 10_000,
        }
    }
}

impl VorticityStreamfunction {
    pub fn vorticity(grid: &ChebyshevGrid2d, fields: &FlowFields) -> DMatrix<f64> {
        grid.d_dy(&fields.u) - grid.d_dx(&fields.v)
    }

    /// Returns `ψ` and the number of relaxation sweeps taken.
    pub fn streamfunction(&self, grid: &ChebyshevGrid2d, omega: &DMatrix<f64>) -> (DMatrix<f64>, usize) {
        let (nx, ny) = grid.shape();
        let mask = interior_mask((nx, ny));
        let (x_coef, y_coef) = grid.scaling();
        let hx = (grid.x_axis().nodes()[0] - grid.x_axis().nodes()[1]).abs() * x_coef;
        let hy = (grid.y_axis().nodes()[0] - grid.y_axis().nodes()[1]).abs() * y_coef;
        let dt = 0.5 * hx.min(hy).powi(2);

        let mut psi = DMatrix::zeros(nx, ny);
        for it in 0..self.max_iterations {
            let update = (grid.laplacian(&psi) - omega).component_mul(&mask);
            let change = update.amax();
            psi += update * dt;
            if self.log_every > 0 && it % self.log_every == 0 {
                debug!("{it:8}, dpsi = {change:e}");
            }
            if change < self.tolerance {
                return (psi, it + 1);
            }
        }
        warn!(
            "Streamfunction relaxation stopped at the cap of {} iterations",
            self.max_iterations
        );
        (psi, self.max_iterations)
    }
}

/// Physical fields of one case on the rotated cavity.
#[derive(Debug, Clone)]
pub struct CaseFields {
    pub x: DMatrix<f64>,
    pub y: DMatrix<f64>,
    pub flow: FlowFields,
    pub omega: DMatrix<f64>,
    pub psi: DMatrix<f64>,
}

impl CaseFields {
    /// Fields of the interior vector `interior` at `alpha = (Ra, Pr, θ°)`.
    pub fn from_interior(
        model: &NaturalConvection,
        alpha: &DVector<f64>,
        interior: &DVector<f64>,
        relaxation: &VorticityStreamfunction,
    ) -> Result<Self> {
        ensure_len("design parameters", 3, alpha.len())?;
        let grid = model.grid();
        let flow = model.full_fields(interior)?;
        let omega = VorticityStreamfunction::vorticity(grid, &flow);
        let (psi, iterations) = relaxation.streamfunction(grid, &omega);
        debug!("Streamfunction for {:?} after {iterations} sweeps", alpha.as_slice());
        let (x, y) = rotated_coordinates(grid, alpha[2]);
        Ok(Self {
            x,
            y,
            flow,
            omega,
            psi,
        })
    }

    /// `x, y, P, u, v, T, ω, ψ` in dump order.
    pub fn layers(&self) -> [&DMatrix<f64>; 8] {
        [
            &self.x,
            &self.y,
            &self.flow.p,
            &self.flow.u,
            &self.flow.v,
            &self.flow.t,
            &self.omega,
            &self.psi,
        ]
    }
}

/// Node coordinates scaled to the cavity size and rotated by `theta_deg`.
pub fn rotated_coordinates(grid: &ChebyshevGrid2d, theta_deg: f64) -> (DMatrix<f64>, DMatrix<f64>) {
    let (xc, yc) = grid.grid();
    let (x_coef, y_coef) = grid.scaling();
    let (sin, cos) = theta_deg.to_radians().sin_cos();
    let xs = xc * x_coef;
    let ys = yc * y_coef;
    (&xs * cos - &ys * sin, &xs * sin + &ys * cos)
}

/// ASCII point-format dump, `i` running fastest.
pub fn write_tecplot<P: AsRef<Path>>(path: P, case: &CaseFields) -> Result<()> {
    let (nx, ny) = case.x.shape();
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "title=\"result\"")?;
    writeln!(
        file,
        "variables=\"x\",\"y\",\"P\",\"u\",\"v\",\"T\",\"omega\",\"psi\""
    )?;
    writeln!(file, "zone,j={ny}, i={nx},f=point")?;
    let layers = case.layers();
    for j in 0..ny {
        for i in 0..nx {
            let row: Vec<String> = layers.iter().map(|f| format!("{:21.16}", f[(i, j)])).collect();
            writeln!(file, "{}", row.join("\t"))?;
        }
    }
    file.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct StackedFields {
    /// `[cases, 8, nx, ny]`
    shape: [usize; 4],
    variables: [&'static str; 8],
    /// `Fields[case][variable][i][j]`
    #[serde(rename = "Fields")]
    fields: Vec<Vec<Vec<Vec<f64>>>>,
}

/// Every case stacked into one JSON array for external post-processing.
pub fn write_stacked_fields<P: AsRef<Path>>(path: P, cases: &[CaseFields]) -> Result<()> {
    let (nx, ny) = cases.first().map_or((0, 0), |c| c.x.shape());
    let mut fields = Vec::with_capacity(cases.len());
    for case in cases {
        ensure_len("stacked field rows", nx, case.x.nrows())?;
        ensure_len("stacked field columns", ny, case.x.ncols())?;
        fields.push(
            case.layers()
                .iter()
                .map(|f| f.row_iter().map(|r| r.iter().copied().collect()).collect())
                .collect(),
        );
    }
    let stacked = StackedFields {
        shape: [cases.len(), 8, nx, ny],
        variables: ["x", "y", "P", "u", "v", "T", "omega", "psi"],
        fields,
    };
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer(file, &stacked)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChebyshevGrid2d {
        ChebyshevGrid2d::new(6, 6, (-1.0, 1.0), (-1.0, 1.0))
            .unwrap()
            .with_scaling(0.5, 0.5)
    }

    #[test]
    fn relaxation_recovers_a_known_streamfunction() {
        let grid = grid();
        let (xc, yc) = grid.grid();
        let exact = xc.zip_map(&yc, |x, y| (1.0 - x * x) * (1.0 - y * y) * (1.0 + 0.3 * x));
        let omega = grid.laplacian(&exact);
        let (psi, iterations) = VorticityStreamfunction::default().streamfunction(&grid, &omega);
        assert!(iterations < 100_000, "took {iterations} sweeps");
        assert!((psi - exact).amax() < 1e-7);
    }

    #[test]
    fn rotation_by_ninety_degrees_swaps_axes() {
        let grid = grid();
        let (x, y) = rotated_coordinates(&grid, 90.0);
        let (xc, yc) = grid.grid();
        assert!((x + yc * 0.5).amax() < 1e-12);
        assert!((y - xc * 0.5).amax() < 1e-12);
    }

    #[test]
    fn tecplot_header_and_row_count() {
        let grid = grid();
        let (x, y) = rotated_coordinates(&grid, 0.0);
        let zero = DMatrix::zeros(7, 7);
        let case = CaseFields {
            x,
            y,
            flow: FlowFields {
                p: zero.clone(),
                u: zero.clone(),
                v: zero.clone(),
                t: zero.clone(),
            },
            omega: zero.clone(),
            psi: zero,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case0.plt");
        write_tecplot(&path, &case).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("zone,j=7, i=7,f=point"));
        assert_eq!(text.lines().count(), 3 + 49);

        let stacked = dir.path().join("fields.json");
        write_stacked_fields(&stacked, &[case.clone(), case]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(stacked).unwrap()).unwrap();
        assert_eq!(json["shape"], serde_json::json!([2, 8, 7, 7]));
    }
}
