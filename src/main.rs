use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use pod_rom::basis::{DesignSpace, SOLVED_VARS, SnapshotSet, Variable};
use pod_rom::config::RomConfig;
use pod_rom::discretization::ChebyshevGrid;
use pod_rom::models::{Manufactured, NaturalConvection};
use pod_rom::numerics::{BatchReport, PodGalerkin};
use pod_rom::physics::Problem;
use pod_rom::processing::{
    CaseFields, ErrorReport, RunSummary, VorticityStreamfunction, csv_writer, evaluate_batch,
    projection_error, write_stacked_fields, write_tecplot,
};
use pod_rom::surrogate::SurrogateBundle;

#[derive(Parser)]
#[command(name = "pod_rom", version, about = "POD-Galerkin reduced-order models", long_about = None)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(short, long, default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manufactured 1D problem end to end, no input files needed
    Demo {
        #[arg(long, value_enum, default_value_t = DemoProblem::Burgers)]
        problem: DemoProblem,
        /// Chebyshev polynomial order (nodes = order + 1)
        #[arg(long, default_value_t = 10)]
        order: usize,
        #[arg(long, default_value_t = 3)]
        modes: usize,
        #[arg(long, default_value = "output/demo")]
        out: PathBuf,
    },
    /// Build, solve and validate from a JSON configuration
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Export the surrogate handoff bundle for a configuration
    Bundle {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoProblem {
    Burgers,
    AdvectionDiffusion,
}

/// Reference solutions: queries are rows of `alphas`, fields columns of `exact`.
struct Validation {
    alphas: DMatrix<f64>,
    exact: DMatrix<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new().filter_level(cli.log_level).try_init()?;

    match cli.command {
        Commands::Demo {
            problem,
            order,
            modes,
            out,
        } => run_demo(problem, order, modes, &out),
        Commands::Run { config } => run_config(&RomConfig::from_file(&config).context("reading configuration")?),
        Commands::Bundle { config, out } => {
            let config = RomConfig::from_file(&config).context("reading configuration")?;
            let snapshots = load_snapshots(&config)?;
            let rom = configure(PodGalerkin::build(&config.problem, &snapshots, config.modes)?, &config);
            SurrogateBundle::from_model(&rom).save(&out)?;
            println!("Bundle saved to {}", out.display());
            Ok(())
        }
    }
}

fn run_demo(kind: DemoProblem, order: usize, modes: usize, out: &Path) -> Result<()> {
    fs::create_dir_all(out).context("creating output directory")?;

    let family = Manufactured::SinePolynomial;
    let problem = match kind {
        DemoProblem::Burgers => Problem::Burgers1d {
            viscosity: 1.0,
            family,
        },
        DemoProblem::AdvectionDiffusion => Problem::AdvectionDiffusion1d {
            velocity: 1.0,
            diffusivity: 0.5,
            family,
        },
    };

    let grid = ChebyshevGrid::new(order, (-1.0, 1.0))?;
    let space = DesignSpace::new(DVector::from_element(2, 1.0), DVector::from_element(2, 2.0))?;
    // 5 × 2 lattice over the design box
    let training = DMatrix::from_fn(10, 2, |s, p| if p == 0 { 1.0 + 0.25 * (s % 5) as f64 } else { 1.0 + (s / 5) as f64 });
    let snapshots = SnapshotSet::sample_manufactured(&grid, training, space, |x, a| family.value(x, a))?;
    snapshots.save(out.join("snapshots.json"))?;

    // cell centres of a 4 × 4 lattice, never on a training point
    let alphas = DMatrix::from_fn(16, 2, |q, p| {
        let k = if p == 0 { q % 4 } else { q / 4 };
        1.125 + 0.25 * k as f64
    });
    let exact = DMatrix::from_fn(grid.len(), alphas.nrows(), |n, q| {
        family.value(grid.nodes()[n], &alphas.row(q).transpose())
    });
    let validation = Validation { alphas, exact };

    let rom = PodGalerkin::build(&problem, &snapshots, modes)?;
    let study: Vec<usize> = (1..=snapshots.num_samples().min(grid.len()).min(7)).collect();
    report_run(&rom, &snapshots, Some(&validation), &study, false, f64::NAN, out)?;
    SurrogateBundle::from_model(&rom).save(out.join("bundle.json"))?;
    Ok(())
}

fn run_config(config: &RomConfig) -> Result<()> {
    let out = &config.output.dir;
    fs::create_dir_all(out).context("creating output directory")?;

    let snapshots = load_snapshots(config)?;
    let validation = match &config.validation {
        Some(path) => {
            let set = SnapshotSet::load(path).with_context(|| format!("loading {}", path.display()))?;
            Some(Validation {
                exact: config.problem.training_matrix(&set)?,
                alphas: set.parameters,
            })
        }
        None => None,
    };

    let rom = configure(PodGalerkin::build(&config.problem, &snapshots, config.modes)?, config);
    if let Some(model) = rom.problem().cavity() {
        check_snapshots(model, &config.problem, &snapshots)?;
    }
    let report = report_run(
        &rom,
        &snapshots,
        validation.as_ref(),
        &config.error_study,
        config.output.parallel,
        config.output.sentinel(),
        out,
    )?;

    if config.output.write_bundle {
        SurrogateBundle::from_model(&rom).save(out.join("bundle.json"))?;
    }
    if config.output.write_fields {
        if let Some(report) = &report {
            dump_fields(&rom, report, out)?;
        }
    }
    Ok(())
}

fn load_snapshots(config: &RomConfig) -> Result<SnapshotSet> {
    let set = SnapshotSet::load(&config.snapshots)
        .with_context(|| format!("loading {}", config.snapshots.display()))?;
    Ok(match config.num_snapshots {
        Some(n) => set.subset(n)?,
        None => set,
    })
}

/// Equation residuals of the raw 2D snapshots on this grid.
fn check_snapshots(model: &NaturalConvection, problem: &Problem, snapshots: &SnapshotSet) -> Result<()> {
    let mut worst = 0.0f64;
    for s in 0..snapshots.num_samples() {
        let coeffs = problem.coefficients(&snapshots.parameter(s))?;
        let [c, mx, my, e] = model.snapshot_rms(&snapshots.samples.column(s).into_owned(), &coeffs)?;
        debug!("Snapshot {s}: rms continuity {c:.3e}, x-momentum {mx:.3e}, y-momentum {my:.3e}, energy {e:.3e}");
        worst = worst.max(c).max(mx).max(my).max(e);
    }
    info!("Largest snapshot equation residual (rms): {worst:.3e}");
    Ok(())
}

fn configure(rom: PodGalerkin, config: &RomConfig) -> PodGalerkin {
    rom.with_newton(config.newton())
        .with_warm_start(config.warm_start())
        .with_fallback(config.fallback)
        .with_formulation(config.formulation)
}

fn variables(rom: &PodGalerkin) -> (usize, Vec<&'static str>) {
    if rom.problem().cavity().is_some() {
        (SOLVED_VARS, Variable::ALL.iter().map(|v| v.name()).collect())
    } else {
        (1, vec!["phi"])
    }
}

/// Solve the validation queries, score them and write the run artifacts.
fn report_run(
    rom: &PodGalerkin,
    snapshots: &SnapshotSet,
    validation: Option<&Validation>,
    error_study: &[usize],
    parallel: bool,
    sentinel: f64,
    out: &Path,
) -> Result<Option<BatchReport>> {
    let mut summary = RunSummary::from_model(rom, snapshots.num_samples());
    let (stride, names) = variables(rom);

    let Some(validation) = validation else {
        summary.write_to_file(out.join("summary.txt"))?;
        summary.print_to_console();
        return Ok(None);
    };

    let solve = |model: &PodGalerkin| model.solve_queries(&validation.alphas, Some(&validation.exact), parallel);

    let report = solve(rom)?;
    summary.add_batch(&report);
    for (q, err) in report.failures() {
        warn!("Query {q} flagged: {err}");
    }
    let errors = evaluate_batch(&report, &rom.basis().modes, &validation.exact, stride)?;
    errors.log(&names);
    let best = projection_error(rom.basis(), &validation.exact)?;
    summary.add_errors(&names, errors, Some(best));

    csv_writer::write_coefficients(out.join("lambda.csv"), &validation.alphas, &report.coefficients(sentinel))?;
    if let Some(Ok(first)) = report.results.first() {
        csv_writer::write_history(out.join("newton_history.csv"), &first.history)?;
    }

    if !error_study.is_empty() {
        let training = rom.problem().problem.training_matrix(snapshots)?;
        let mut rows: Vec<(usize, ErrorReport)> = Vec::new();
        for &m in error_study {
            if m > training.nrows().min(training.ncols()) {
                warn!("Skipping M = {m}: above the snapshot rank bound");
                continue;
            }
            let model = rom.rebuild(snapshots, m)?;
            match evaluate_batch(&solve(&model)?, &model.basis().modes, &validation.exact, stride) {
                Ok(errors) => {
                    info!("M = {m}: total relative error {:.3e}", errors.total);
                    rows.push((m, errors));
                }
                Err(e) => warn!("M = {m}: no converged queries ({e})"),
            }
        }
        csv_writer::write_error_table(out.join("errors_vs_modes.csv"), &names, &rows)?;
    }

    summary.write_to_file(out.join("summary.txt"))?;
    summary.print_to_console();
    println!("Summary saved to {}", out.join("summary.txt").display());
    Ok(Some(report))
}

fn dump_fields(rom: &PodGalerkin, report: &BatchReport, out: &Path) -> Result<()> {
    let Some(model) = rom.problem().cavity() else {
        warn!("Field dumps are only written for the 2D cavity");
        return Ok(());
    };
    let relaxation = VorticityStreamfunction::default();
    let mut cases = Vec::new();
    for (q, result) in report.results.iter().enumerate() {
        let Ok(solution) = result else { continue };
        let alpha = report.alphas.row(q).transpose();
        let interior = rom.basis().reconstruct(&solution.lambda)?;
        let case = CaseFields::from_interior(model, &alpha, &interior, &relaxation)?;
        write_tecplot(out.join(format!("case{q}.plt")), &case)?;
        cases.push(case);
    }
    write_stacked_fields(out.join("fields.json"), &cases)?;
    info!("Wrote {} field dumps to {}", cases.len(), out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_is_parsed_by_name() {
        let cli = Cli::try_parse_from(["pod_rom", "--log-level", "debug", "run", "-c", "rom.json"]).unwrap();
        assert_eq!(cli.log_level, log::LevelFilter::Debug);

        let cli = Cli::try_parse_from(["pod_rom", "bundle", "-c", "rom.json", "-o", "b.json"]).unwrap();
        assert_eq!(cli.log_level, log::LevelFilter::Info);
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(Cli::try_parse_from(["pod_rom", "--log-level", "loud", "run", "-c", "rom.json"]).is_err());
    }
}
