use nalgebra::{DMatrix, DVector};

use pod_rom::basis::{DesignSpace, NormalizationStats, SnapshotSet};
use pod_rom::config::RomConfig;
use pod_rom::discretization::ChebyshevGrid;
use pod_rom::models::Manufactured;
use pod_rom::numerics::{
    FallbackPolicy, Formulation, NewtonConfig, NormalizedSolver, PodGalerkin, SolveError, WarmStart,
};
use pod_rom::physics::{Problem, ReducedModel};
use pod_rom::processing::{evaluate_batch, evaluate_surrogate, projection_error, reconstruct, relative_error};
use pod_rom::surrogate::{NearestSample, SurrogateBundle, equation_loss, labeled_loss};

// 11 Chebyshev nodes, 10 snapshots on a 5 × 2 lattice of [1, 2]²
fn training_set(family: Manufactured) -> SnapshotSet {
    let grid = ChebyshevGrid::new(10, (-1.0, 1.0)).unwrap();
    let params = DMatrix::from_fn(10, 2, |s, p| if p == 0 { 1.0 + 0.25 * (s % 5) as f64 } else { 1.0 + (s / 5) as f64 });
    let space = DesignSpace::new(DVector::from_element(2, 1.0), DVector::from_element(2, 2.0)).unwrap();
    SnapshotSet::sample_manufactured(&grid, params, space, |x, a| family.value(x, a)).unwrap()
}

fn burgers(family: Manufactured) -> Problem {
    Problem::Burgers1d { viscosity: 1.0, family }
}

fn queries() -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 2, &[1.37, 1.61, 1.9, 1.2])
}

fn solve_error(rom: &PodGalerkin, alpha: &DVector<f64>) -> f64 {
    let sol = rom.solve(alpha).unwrap();
    let pred = reconstruct(&sol.lambda, &rom.basis().modes).unwrap();
    let exact = rom.problem().exact_field(alpha).unwrap();
    relative_error(&pred, &exact).unwrap()
}

#[test]
fn burgers_end_to_end_tightens_with_modes() {
    let set = training_set(Manufactured::SinePolynomial);
    let problem = burgers(Manufactured::SinePolynomial);
    let alphas = queries();

    for (modes, threshold) in [(3, 1e-2), (5, 1e-3)] {
        let rom = PodGalerkin::build(&problem, &set, modes).unwrap();
        for q in 0..alphas.nrows() {
            let alpha = alphas.row(q).transpose();
            let err = solve_error(&rom, &alpha);
            assert!(err < threshold, "M = {modes}, alpha = {alpha:?}: error {err:.3e}");

            // the Galerkin answer can never beat the orthogonal projection
            let exact = rom.problem().exact_field(&alpha).unwrap();
            let best = projection_error(rom.basis(), &DMatrix::from_columns(&[exact])).unwrap();
            assert!(err >= best * (1.0 - 1e-9), "error {err:.3e} below projection {best:.3e}");
        }
    }
}

#[test]
fn advection_diffusion_end_to_end() {
    let family = Manufactured::SinePolynomial;
    let problem = Problem::AdvectionDiffusion1d {
        velocity: 1.0,
        diffusivity: 1.0,
        family,
    };
    let rom = PodGalerkin::build(&problem, &training_set(family), 3).unwrap();
    let report = rom.solve_batch(&queries());
    assert_eq!(report.len(), 2);
    assert!(report.all_converged());
    // linear problem: one Newton step
    for result in &report.results {
        assert_eq!(result.as_ref().unwrap().iterations, 1);
    }

    let nodes = ChebyshevGrid::new(10, (-1.0, 1.0)).unwrap().nodes().clone();
    let alphas = queries();
    let exact = DMatrix::from_fn(11, 2, |n, q| family.value(nodes[n], &alphas.row(q).transpose()));
    let errors = evaluate_batch(&report, &rom.basis().modes, &exact, 1).unwrap();
    assert_eq!(errors.cases, 2);
    assert!(errors.total < 1e-2, "total error {:.3e}", errors.total);
}

#[test]
fn exactly_representable_solution_is_recovered() {
    let family = Manufactured::PolynomialPair;
    let rom = PodGalerkin::build(&burgers(family), &training_set(family), 2).unwrap();
    for q in 0..queries().nrows() {
        let alpha = queries().row(q).transpose();
        let sol = rom.solve(&alpha).unwrap();
        assert!(sol.final_residual < 1e-8, "residual {:.3e}", sol.final_residual);
        assert!(sol.iterations <= 20);
        assert!(solve_error(&rom, &alpha) < 1e-6);
    }
}

#[test]
fn non_convergence_is_surfaced() {
    let set = training_set(Manufactured::SinePolynomial);
    // two Newton steps from the nearest sample are not enough for 1e-10
    let rom = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 3)
        .unwrap()
        .with_newton(NewtonConfig {
            max_iterations: 2,
            ..NewtonConfig::default()
        });
    match rom.solve(&DVector::from_vec(vec![1.5, 1.5])) {
        Err(SolveError::MaxIterExceeded {
            iterations, alpha, residual,
        }) => {
            assert_eq!(iterations, 2);
            assert_eq!(alpha, vec![1.5, 1.5]);
            assert!(residual > 1e-10 && residual.is_finite());
        }
        other => panic!("expected MaxIterExceeded, got {other:?}"),
    }
}

#[test]
fn continuation_recovers_a_failed_query() {
    let set = training_set(Manufactured::SinePolynomial);
    let newton = NewtonConfig {
        max_iterations: 2,
        ..NewtonConfig::default()
    };
    let alpha = DVector::from_vec(vec![1.5, 1.5]);
    let rom = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 3)
        .unwrap()
        .with_newton(newton)
        .with_fallback(FallbackPolicy::Continuation { steps: 20 });
    let sol = rom.solve(&alpha).unwrap();
    assert!(sol.final_residual <= 1e-10);

    let reference = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 3)
        .unwrap()
        .solve(&alpha)
        .unwrap();
    assert!((sol.lambda - reference.lambda).amax() < 1e-8);
}

#[test]
fn next_nearest_sample_is_tried_on_failure() {
    let set = training_set(Manufactured::SinePolynomial);
    let newton = NewtonConfig {
        tolerance: 1e-9,
        max_iterations: 2,
        ..NewtonConfig::default()
    };
    let alpha = DVector::from_vec(vec![1.9, 1.8]);
    let strict = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 3)
        .unwrap()
        .with_newton(newton);
    assert!(matches!(strict.solve(&alpha), Err(SolveError::MaxIterExceeded { .. })));

    let retrying = strict.with_fallback(FallbackPolicy::NextNearest { attempts: 1 });
    assert!(retrying.solve(&alpha).is_ok());
}

#[test]
fn normalized_formulation_agrees_with_newton() {
    let set = training_set(Manufactured::SinePolynomial);
    let problem = burgers(Manufactured::SinePolynomial);
    let plain = PodGalerkin::build(&problem, &set, 3).unwrap();
    let damped = plain.clone().with_formulation(Formulation::Normalized);
    for q in 0..queries().nrows() {
        let alpha = queries().row(q).transpose();
        let a = plain.solve(&alpha).unwrap();
        let b = damped.solve(&alpha).unwrap();
        assert!((a.lambda - b.lambda).amax() < 1e-8);
    }
}

/// A reduced model written outside the crate: `λ_k³ − c_k = 0` per mode.
struct CubicModel {
    targets: Vec<f64>,
}

impl<T: nalgebra::Scalar + num_dual::DualNum<f64>> ReducedModel<T> for CubicModel {
    fn num_modes(&self) -> usize {
        self.targets.len()
    }

    fn calculate_residual(&self, lambda: DVector<T>) -> DVector<T> {
        DVector::from_iterator(
            lambda.len(),
            lambda.iter().zip(&self.targets).map(|(l, &c)| l.powi(3) - T::from(c)),
        )
    }
}

#[test]
fn normalized_solver_accepts_user_models() {
    let model = CubicModel {
        targets: vec![8.0, -1.0],
    };
    let stats = NormalizationStats {
        mean: DVector::from_vec(vec![1.0, -0.5]),
        std: DVector::from_vec(vec![0.5, 0.5]),
    };
    let solver = NormalizedSolver::new(&NewtonConfig {
        tolerance: 1e-12,
        ..NewtonConfig::default()
    });
    let sol = solver
        .solve(&model, &stats, DVector::from_vec(vec![1.5, -0.8]), &DVector::zeros(1))
        .unwrap();
    assert!((sol.lambda[0] - 2.0).abs() < 1e-10);
    assert!((sol.lambda[1] + 1.0).abs() < 1e-10);
}

#[test]
fn surrogate_evaluation_is_agnostic() {
    let set = training_set(Manufactured::SinePolynomial);
    let rom = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 3).unwrap();
    let alphas = queries();
    let exact = DMatrix::from_fn(11, 2, |n, q| {
        rom.problem().exact_field(&alphas.row(q).transpose()).unwrap()[n]
    });

    let galerkin = evaluate_surrogate(&rom, &rom.basis().modes, &alphas, &exact, 1).unwrap();
    let lookup = NearestSample::from_model(&rom).unwrap();
    let baseline = evaluate_surrogate(&lookup, &rom.basis().modes, &alphas, &exact, 1).unwrap();
    assert!(galerkin.total < baseline.total);

    let wrong = DMatrix::zeros(11, 3);
    assert!(evaluate_surrogate(&rom, &rom.basis().modes, &alphas, &wrong, 1).is_err());
}

#[test]
fn bundle_losses_vanish_on_training_data() {
    let set = training_set(Manufactured::PolynomialPair);
    let rom = PodGalerkin::build(&burgers(Manufactured::PolynomialPair), &set, 2).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.json");
    SurrogateBundle::from_model(&rom).save(&path).unwrap();
    let bundle = SurrogateBundle::load(&path).unwrap();

    assert_eq!(bundle.num_modes(), 2);
    assert_eq!(bundle.linear_groups, vec!["diffusion".to_string()]);

    // projections of exact snapshots solve the exact reduced system
    let loss = equation_loss(|a| bundle.system(a), &bundle.labeled_inputs, &bundle.labeled_outputs).unwrap();
    assert!(loss < 1e-16, "equation loss {loss:.3e}");
    let labeled = labeled_loss(&bundle.stats, &bundle.labeled_outputs, &bundle.labeled_outputs).unwrap();
    assert_eq!(labeled, 0.0);
}

#[test]
fn snapshot_and_config_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let set = training_set(Manufactured::SinePolynomial);
    let snap_path = dir.path().join("snapshots.json");
    set.save(&snap_path).unwrap();
    let loaded = SnapshotSet::load(&snap_path).unwrap();
    assert_eq!(loaded.samples, set.samples);
    assert_eq!(loaded.parameters, set.parameters);
    assert_eq!(loaded.design_space, set.design_space);

    let json = format!(
        r#"{{"problem": {{"kind": "burgers1d", "viscosity": 1.0}}, "snapshots": {:?}, "modes": 4,
            "fallback": {{"kind": "continuation", "steps": 8}}, "error_study": [2, 3]}}"#,
        snap_path
    );
    let config: RomConfig = serde_json::from_str(&json).unwrap();
    let cfg_path = dir.path().join("config.json");
    config.save_to_file(&cfg_path).unwrap();
    let reread = RomConfig::from_file(&cfg_path).unwrap();
    assert_eq!(reread.modes, 4);
    assert_eq!(reread.fallback, FallbackPolicy::Continuation { steps: 8 });
    assert_eq!(reread.error_study, vec![2, 3]);
    assert_eq!(reread.snapshots, snap_path);
}

#[test]
fn rank_request_above_snapshot_count_fails() {
    let set = training_set(Manufactured::SinePolynomial).subset(4).unwrap();
    let err = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 5).unwrap_err();
    assert!(matches!(err, pod_rom::RomError::RankTooLarge { requested: 5, available: 4 }));
}

#[test]
fn provided_warm_start_begins_at_the_reference_projection() {
    let family = Manufactured::PolynomialPair;
    let problem = burgers(family);
    let set = training_set(family);
    let alphas = queries();
    let grid = ChebyshevGrid::new(10, (-1.0, 1.0)).unwrap();
    let exact = DMatrix::from_fn(grid.len(), alphas.nrows(), |n, q| {
        family.value(grid.nodes()[n], &alphas.row(q).transpose())
    });

    let nearest = PodGalerkin::build(&problem, &set, 2).unwrap();
    assert_eq!(nearest.warm_start(), WarmStart::Nearest);
    let from_samples = nearest.solve_queries(&alphas, Some(&exact), false).unwrap();

    let provided = nearest.clone().with_warm_start(WarmStart::Provided);
    let from_reference = provided.solve_queries(&alphas, Some(&exact), false).unwrap();
    assert!(from_reference.all_converged());

    for (a, b) in from_samples.results.iter().zip(&from_reference.results) {
        let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
        assert!(a.history[0] > 1e-6, "sample start residual {:.3e}", a.history[0]);
        assert!(b.history[0] < 1e-8, "reference start residual {:.3e}", b.history[0]);
        assert!((&a.lambda - &b.lambda).amax() < 1e-8);
    }

    // without reference fields the scaled nearest sample is used
    assert!(provided.solve_queries(&alphas, None, false).unwrap().all_converged());
}

#[test]
fn rebuilt_models_keep_the_online_policy() {
    let set = training_set(Manufactured::SinePolynomial);
    let newton = NewtonConfig {
        max_iterations: 7,
        ..NewtonConfig::default()
    };
    let rom = PodGalerkin::build(&burgers(Manufactured::SinePolynomial), &set, 3)
        .unwrap()
        .with_newton(newton.clone())
        .with_warm_start(WarmStart::NearestScaled)
        .with_fallback(FallbackPolicy::Continuation { steps: 8 })
        .with_formulation(Formulation::Normalized);

    let smaller = rom.rebuild(&set, 2).unwrap();
    assert_eq!(smaller.num_modes(), 2);
    assert_eq!(smaller.newton(), &newton);
    assert_eq!(smaller.warm_start(), WarmStart::NearestScaled);
    assert_eq!(smaller.fallback(), FallbackPolicy::Continuation { steps: 8 });
    assert_eq!(smaller.formulation(), Formulation::Normalized);
}
