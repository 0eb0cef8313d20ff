use log::{info, warn};
use nalgebra::{DMatrix, DVector};

use crate::basis::PodBasis;
use crate::error::{Result, RomError, ensure_len};
use crate::numerics::BatchReport;
use crate::surrogate::Surrogate;

/// `modes · λ`
pub fn reconstruct(lambda: &DVector<f64>, modes: &DMatrix<f64>) -> Result<DVector<f64>> {
    ensure_len("coefficients", modes.ncols(), lambda.len())?;
    Ok(modes * lambda)
}

/// `‖exact − pred‖₂ / ‖exact‖₂`. A zero exact field gives zero error for a zero
/// prediction and infinity otherwise.
pub fn relative_error(pred: &DVector<f64>, exact: &DVector<f64>) -> Result<f64> {
    ensure_len("predicted field", exact.len(), pred.len())?;
    let diff = (exact - pred).norm();
    let scale = exact.norm();
    if scale == 0.0 {
        return Ok(if diff == 0.0 { 0.0 } else { f64::INFINITY });
    }
    Ok(diff / scale)
}

/// Relative error per case (one column each), averaged over the cases.
pub fn mean_relative_error(pred: &DMatrix<f64>, exact: &DMatrix<f64>) -> Result<f64> {
    check_cases(pred, exact)?;
    let mut total = 0.0;
    for (p, e) in pred.column_iter().zip(exact.column_iter()) {
        total += relative_error(&p.into_owned(), &e.into_owned())?;
    }
    Ok(total / exact.ncols() as f64)
}

/// Validation errors of one run: one entry per interleaved variable plus the
/// error over the whole vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub per_variable: Vec<f64>,
    pub total: f64,
    /// Number of cases that entered the averages.
    pub cases: usize,
}

impl ErrorReport {
    pub fn log(&self, names: &[&str]) {
        for (k, err) in self.per_variable.iter().enumerate() {
            let name = names.get(k).copied().unwrap_or("?");
            info!("  relative error {name:>4}: {err:.6e}");
        }
        info!("  relative error  all: {:.6e} ({} cases)", self.total, self.cases);
    }
}

/// Mean relative errors of each interleaved variable (`stride` values per
/// point) and of the full vectors.
pub fn per_variable_errors(pred: &DMatrix<f64>, exact: &DMatrix<f64>, stride: usize) -> Result<ErrorReport> {
    check_cases(pred, exact)?;
    if stride == 0 || exact.nrows() % stride != 0 {
        return Err(RomError::ShapeMismatch {
            what: "interleaved stride",
            expected: stride,
            found: exact.nrows(),
        });
    }
    let points = exact.nrows() / stride;
    let variable = |m: &DMatrix<f64>, var: usize| {
        DMatrix::from_fn(points, m.ncols(), |p, c| m[(p * stride + var, c)])
    };
    let per_variable = (0..stride)
        .map(|var| mean_relative_error(&variable(pred, var), &variable(exact, var)))
        .collect::<Result<Vec<_>>>()?;
    Ok(ErrorReport {
        per_variable,
        total: mean_relative_error(pred, exact)?,
        cases: exact.ncols(),
    })
}

/// Error of the best approximation the basis allows: exact fields projected
/// onto the modes and lifted back.
pub fn projection_error(basis: &PodBasis, exact: &DMatrix<f64>) -> Result<f64> {
    let best = basis.reconstruct_many(&basis.project(exact)?)?;
    mean_relative_error(&best, exact)
}

/// Predict every row of `alphas` and compare the reconstructed fields with
/// the columns of `exact`.
pub fn evaluate_surrogate<S: Surrogate + ?Sized>(
    surrogate: &S,
    modes: &DMatrix<f64>,
    alphas: &DMatrix<f64>,
    exact: &DMatrix<f64>,
    stride: usize,
) -> Result<ErrorReport> {
    if alphas.nrows() != exact.ncols() {
        return Err(RomError::SampleCountMismatch {
            what: "validation parameters vs fields",
            left: alphas.nrows(),
            right: exact.ncols(),
        });
    }
    let lambdas = surrogate.predict_batch(alphas)?;
    ensure_len("basis modes", modes.ncols(), lambdas.nrows())?;
    per_variable_errors(&(modes * lambdas), exact, stride)
}

/// Errors of the converged queries of a batch. Failed queries are skipped and
/// logged rather than scored with a sentinel.
pub fn evaluate_batch(
    report: &BatchReport,
    modes: &DMatrix<f64>,
    exact: &DMatrix<f64>,
    stride: usize,
) -> Result<ErrorReport> {
    if report.len() != exact.ncols() {
        return Err(RomError::SampleCountMismatch {
            what: "batch results vs validation fields",
            left: report.len(),
            right: exact.ncols(),
        });
    }
    let kept: Vec<usize> = (0..report.len()).filter(|&q| report.results[q].is_ok()).collect();
    for (q, err) in report.failures() {
        warn!("Validation case {q} skipped: {err}");
    }
    if kept.is_empty() {
        return Err(RomError::SampleCountMismatch {
            what: "converged validation cases",
            left: 0,
            right: report.len(),
        });
    }
    let lambdas = report.coefficients(f64::NAN).select_columns(&kept);
    ensure_len("basis modes", modes.ncols(), lambdas.nrows())?;
    per_variable_errors(&(modes * lambdas), &exact.select_columns(&kept), stride)
}

fn check_cases(pred: &DMatrix<f64>, exact: &DMatrix<f64>) -> Result<()> {
    if pred.ncols() != exact.ncols() || exact.ncols() == 0 {
        return Err(RomError::SampleCountMismatch {
            what: "predicted vs exact cases",
            left: pred.ncols(),
            right: exact.ncols(),
        });
    }
    ensure_len("predicted field", exact.nrows(), pred.nrows())
}
