use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use nalgebra::DMatrix;

use super::validation::ErrorReport;

/// Write equal-length columns under `headers`. Shorter columns leave blank cells.
pub fn write_columns<P: AsRef<Path>>(path: P, headers: &[String], columns: &[Vec<f64>]) -> io::Result<()> {
    if headers.len() != columns.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Headers count ({}) doesn't match data columns ({})",
                headers.len(),
                columns.len()
            ),
        ));
    }

    let mut file = File::create(path)?;
    writeln!(file, "{}", headers.join(","))?;

    let n_rows = columns.iter().map(Vec::len).max().unwrap_or(0);
    for i in 0..n_rows {
        let row: Vec<String> = columns
            .iter()
            .map(|col| col.get(i).map_or_else(String::new, |v| format!("{v:.15e}")))
            .collect();
        writeln!(file, "{}", row.join(","))?;
    }
    Ok(())
}

/// One row per query: the design parameters followed by the coefficients.
/// `alphas` is `NQ × P`, `lambdas` is `M × NQ`.
pub fn write_coefficients<P: AsRef<Path>>(path: P, alphas: &DMatrix<f64>, lambdas: &DMatrix<f64>) -> io::Result<()> {
    if alphas.nrows() != lambdas.ncols() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} queries but {} coefficient columns",
                alphas.nrows(),
                lambdas.ncols()
            ),
        ));
    }
    let mut headers: Vec<String> = (0..alphas.ncols()).map(|p| format!("alpha_{p}")).collect();
    headers.extend((0..lambdas.nrows()).map(|k| format!("lambda_{k}")));

    let mut columns: Vec<Vec<f64>> = alphas.column_iter().map(|c| c.iter().copied().collect()).collect();
    columns.extend(lambdas.row_iter().map(|r| r.iter().copied().collect()));
    write_columns(path, &headers, &columns)
}

/// Error study: one row per basis size.
pub fn write_error_table<P: AsRef<Path>>(path: P, variables: &[&str], rows: &[(usize, ErrorReport)]) -> io::Result<()> {
    let mut headers = vec!["modes".to_string()];
    headers.extend(variables.iter().map(|v| format!("error_{v}")));
    headers.push("error_total".to_string());

    let mut columns = vec![rows.iter().map(|(m, _)| *m as f64).collect::<Vec<_>>()];
    for k in 0..variables.len() {
        columns.push(
            rows.iter()
                .map(|(_, r)| r.per_variable.get(k).copied().unwrap_or(f64::NAN))
                .collect(),
        );
    }
    columns.push(rows.iter().map(|(_, r)| r.total).collect());
    write_columns(path, &headers, &columns)
}

/// Residual norm per Newton iteration.
pub fn write_history<P: AsRef<Path>>(path: P, history: &[f64]) -> io::Result<()> {
    let iterations = (0..history.len()).map(|i| i as f64).collect();
    write_columns(
        path,
        &["iteration".to_string(), "residual".to_string()],
        &[iterations, history.to_vec()],
    )
}
