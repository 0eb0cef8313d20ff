use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::numerics::{BatchReport, PodGalerkin};

use super::validation::ErrorReport;

pub struct RunSummary {
    // Offline stage
    pub problem: String,
    pub num_samples: usize,
    pub dof: usize,
    pub modes: usize,
    pub energy_captured: f64,
    pub leading_singular_values: Vec<f64>,

    // Solver settings
    pub tolerance: f64,
    pub max_iterations: usize,

    // Online stage
    pub queries: Option<usize>,
    pub converged: Option<usize>,
    pub mean_iterations: Option<f64>,
    pub max_final_residual: Option<f64>,
    pub failures: Vec<String>,

    // Validation
    pub variables: Vec<String>,
    pub errors: Option<ErrorReport>,
    pub projection_error: Option<f64>,
}

impl RunSummary {
    pub fn from_model(model: &PodGalerkin, num_samples: usize) -> Self {
        let basis = model.basis();
        let problem = &model.problem().problem;
        Self {
            problem: problem.name().to_string(),
            num_samples,
            dof: basis.dof(),
            modes: basis.num_modes(),
            energy_captured: basis.energy_fraction(basis.num_modes()),
            leading_singular_values: basis.singular_values.iter().take(basis.num_modes() + 2).copied().collect(),
            tolerance: model.newton().tolerance,
            max_iterations: model.newton().max_iterations,
            queries: None,
            converged: None,
            mean_iterations: None,
            max_final_residual: None,
            failures: Vec::new(),
            variables: Vec::new(),
            errors: None,
            projection_error: None,
        }
    }

    pub fn add_batch(&mut self, report: &BatchReport) {
        let solved: Vec<_> = report.results.iter().filter_map(|r| r.as_ref().ok()).collect();
        self.queries = Some(report.len());
        self.converged = Some(solved.len());
        if !solved.is_empty() {
            self.mean_iterations =
                Some(solved.iter().map(|s| s.iterations as f64).sum::<f64>() / solved.len() as f64);
            self.max_final_residual = Some(solved.iter().map(|s| s.final_residual).fold(0.0, f64::max));
        }
        self.failures = report.failures().map(|(q, e)| format!("case {q}: {e}")).collect();
    }

    pub fn add_errors(&mut self, variables: &[&str], errors: ErrorReport, projection_error: Option<f64>) {
        self.variables = variables.iter().map(|v| v.to_string()).collect();
        self.errors = Some(errors);
        self.projection_error = projection_error;
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "POD-G REDUCED-ORDER MODEL SUMMARY")?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file)?;

        writeln!(file, "OFFLINE STAGE")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Problem:             {}", self.problem)?;
        writeln!(file, "Snapshots:           {}", self.num_samples)?;
        writeln!(file, "Degrees of freedom:  {}", self.dof)?;
        writeln!(file, "POD modes:           {}", self.modes)?;
        writeln!(file, "Energy captured:     {:.10}", self.energy_captured)?;
        writeln!(file, "Singular values:")?;
        for (k, s) in self.leading_singular_values.iter().enumerate() {
            let marker = if k < self.modes { "" } else { "  (truncated)" };
            writeln!(file, "  s[{k}] = {s:.6e}{marker}")?;
        }
        writeln!(file)?;

        writeln!(file, "NEWTON SETTINGS")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Tolerance:           {:.3e}", self.tolerance)?;
        writeln!(file, "Max iterations:      {}", self.max_iterations)?;
        writeln!(file)?;

        if let (Some(queries), Some(converged)) = (self.queries, self.converged) {
            writeln!(file, "ONLINE STAGE")?;
            writeln!(file, "{}", "-".repeat(60))?;
            writeln!(file, "Queries:             {}", queries)?;
            writeln!(file, "Converged:           {}", converged)?;
            if let Some(it) = self.mean_iterations {
                writeln!(file, "Mean iterations:     {:.2}", it)?;
            }
            if let Some(res) = self.max_final_residual {
                writeln!(file, "Max final residual:  {:.6e}", res)?;
            }
            for failure in &self.failures {
                writeln!(file, "  FAILED {failure}")?;
            }
            writeln!(file)?;
        }

        if let Some(errors) = &self.errors {
            writeln!(file, "VALIDATION ({} cases)", errors.cases)?;
            writeln!(file, "{}", "-".repeat(60))?;
            for (name, err) in self.variables.iter().zip(&errors.per_variable) {
                writeln!(file, "Relative error {:<5} {:.6e}", name, err)?;
            }
            writeln!(file, "Relative error total {:.6e}", errors.total)?;
            if let Some(best) = self.projection_error {
                writeln!(file, "Projection error     {:.6e}", best)?;
            }
            writeln!(file)?;
        }

        writeln!(file, "{}", "=".repeat(60))?;

        Ok(())
    }

    pub fn print_to_console(&self) {
        println!("\n{}", "=".repeat(60));
        println!("POD-G SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Problem:       {}", self.problem);
        println!(
            "Basis:         {} modes from {} snapshots ({:.6} energy)",
            self.modes, self.num_samples, self.energy_captured
        );
        if let (Some(q), Some(c)) = (self.queries, self.converged) {
            println!("Converged:     {c}/{q}");
        }
        if let Some(errors) = &self.errors {
            let per_var: Vec<String> = errors.per_variable.iter().map(|e| format!("{e:.3e}")).collect();
            println!("Errors:        [{}], total {:.3e}", per_var.join(", "), errors.total);
        }
        println!("{}\n", "=".repeat(60));
    }
}
