mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};

use common::Synth;
use rid_eval::detectors::{Detector, DetectorKind, MultilatDetector, PassThroughDetector, TxPowerDetector};
use rid_eval::evaluate::{dataset_fingerprint, evaluate_detector, run_evaluation};
use rid_eval::metrics::compute_roc_auc;
use rid_eval::optimize::{
    grid_search, line_search_threshold, optimize_threshold, CollectOptions, OperatingTarget, ParamGrid,
};
use rid_eval::scenario::load_dataset;
use rid_eval::{EvalError, Scenario};
use rid_types::{ParamMap, ResultArtifact};

// ── Metric properties ─────────────────────────────────────────────────────────

#[test]
fn random_scores_have_chance_auc() {
    let mut rng = StdRng::seed_from_u64(42);
    let unit = Uniform::new(0.0, 1.0);
    let scores: Vec<f64> = (0..20_000).map(|_| unit.sample(&mut rng)).collect();
    let labels: Vec<bool> = (0..20_000).map(|_| rng.gen_bool(0.3)).collect();

    let roc = compute_roc_auc(&scores, &labels);
    assert!((roc.auc - 0.5).abs() < 0.02, "auc {}", roc.auc);
}

#[test]
fn roc_rates_never_decrease() {
    let mut rng = StdRng::seed_from_u64(3);
    // coarse scores so ties are common
    let scores: Vec<f64> = (0..500).map(|_| rng.gen_range(0..20) as f64).collect();
    let labels: Vec<bool> = scores.iter().map(|&s| rng.gen_bool(0.2 + s / 40.0)).collect();

    let roc = compute_roc_auc(&scores, &labels);
    assert!(roc.fpr.windows(2).all(|w| w[1] >= w[0]));
    assert!(roc.tpr.windows(2).all(|w| w[1] >= w[0]));
    assert!(roc.thresholds.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(*roc.fpr.last().unwrap(), 1.0);
    assert_eq!(*roc.tpr.last().unwrap(), 1.0);
}

// ── Detectors ─────────────────────────────────────────────────────────────────

fn all_detectors() -> Vec<DetectorKind> {
    vec![
        PassThroughDetector.into(),
        MultilatDetector { min_federates: 6, ..MultilatDetector::default() }.into(),
        TxPowerDetector::default().into(),
    ]
}

#[test]
fn detect_is_score_at_or_above_threshold() {
    let s = Synth::default().scenario("s");
    for d in all_detectors() {
        let scores = d.score(&s);
        assert_eq!(scores.len(), s.n_events());
        for t in [0.0, 0.5, 1.0, 5.0, 40.0] {
            let flags = d.detect(&s, t);
            assert!(scores.iter().zip(&flags).all(|(&sc, &f)| f == (sc >= t)), "{} @ {t}", d.name());
        }
    }
}

#[test]
fn scores_are_deterministic() {
    let s = Synth::default().scenario("s");
    for d in all_detectors() {
        assert_eq!(d.score(&s), d.score(&s), "{}", d.name());
    }
}

#[test]
fn multilateration_broadcasts_one_score_per_transmission() {
    let s = Synth::default().scenario("s");
    let d = MultilatDetector { min_federates: 6, ..MultilatDetector::default() };
    let (scores, stats) = d.score_with_stats(&s);
    assert_eq!(stats.coverage_gaps, 0);
    assert_eq!(stats.scored, stats.transmissions);

    for indices in s.transmissions().values() {
        let first = scores[indices[0]];
        assert!(indices.iter().all(|&i| scores[i] == first));
    }
}

#[test]
fn multilateration_flags_the_displaced_claim() {
    let s = Synth::default().scenario("s");
    let d = MultilatDetector { min_federates: 6, ..MultilatDetector::default() };
    let scores = d.score(&s);

    let roc = compute_roc_auc(&scores, s.is_spoofed());
    assert!(roc.auc > 0.95, "auc {}", roc.auc);
    // honest claims agree with the fit
    for (i, &sc) in scores.iter().enumerate() {
        if !s.is_spoofed()[i] {
            assert!(sc < 0.1, "benign score {sc} at event {i}");
        }
    }
}

#[test]
fn thin_coverage_scores_zero() {
    let synth = Synth::default();
    // drop federates 4..=6 from every transmission
    let events: Vec<_> = synth.events().into_iter().filter(|e| e.host_id <= 3 || e.host_id == 7).collect();
    let s = Scenario::from_events("thin", events, 1..=6);
    let (scores, stats) = MultilatDetector::default().score_with_stats(&s);
    assert!(scores.iter().all(|&v| v == 0.0));
    assert_eq!(stats.coverage_gaps, stats.transmissions);
}

// ── Optimization / grid search ────────────────────────────────────────────────

/// Test-only detector that peeks at labels so its AUC is known in advance.
struct LabelPeek {
    strength: f64,
    invert: bool,
    params: ParamMap,
}

impl Detector for LabelPeek {
    fn name(&self) -> &'static str { "LabelPeek" }
    fn params(&self) -> ParamMap { self.params.clone() }
    fn score(&self, s: &Scenario) -> Vec<f64> {
        s.is_spoofed()
            .iter()
            .map(|&l| {
                let v = if l { self.strength } else { 0.0 };
                if self.invert { -v } else { v }
            })
            .collect()
    }
}

fn peek_factory(p: &ParamMap) -> rid_eval::Result<LabelPeek> {
    Ok(LabelPeek {
        strength: p["strength"].as_f64().unwrap(),
        invert: p["invert"].as_bool().unwrap(),
        params: p.clone(),
    })
}

#[test]
fn grid_search_keeps_first_strict_best() {
    let train = vec![Synth::default().scenario("a")];
    let grid = ParamGrid::new().axis("strength", [1.0, 2.0]).axis("invert", [false, true]);

    let result = grid_search(peek_factory, &grid, &train, CollectOptions::default()).unwrap();
    assert_eq!(result.trials.len(), 4);
    let aucs: Vec<f64> = result.trials.iter().map(|t| t.1).collect();
    assert_eq!(aucs, vec![1.0, 0.0, 1.0, 0.0]);
    // strength 2.0 ties at AUC 1.0; the first combination wins
    assert_eq!(result.best.best_params["strength"].as_f64(), Some(1.0));
    assert_eq!(result.best.best_params["invert"].as_bool(), Some(false));
}

#[test]
fn grid_search_propagates_factory_errors() {
    let train = vec![Synth::default().scenario("a")];
    let grid = ParamGrid::new().axis("bogus", [1.0]);
    let mlat = DetectorKind::from(MultilatDetector::default());
    let err = grid_search(|p| mlat.with_params(p), &grid, &train, CollectOptions::default()).unwrap_err();
    assert!(matches!(err, EvalError::UnknownParameter { .. }));
}

#[test]
fn line_search_reports_training_rates() {
    let train = vec![Synth::default().scenario("a"), Synth { seed: 8, ..Synth::default() }.scenario("b")];
    let kf = PassThroughDetector;
    let opts = CollectOptions::default();

    let strict = line_search_threshold(&kf, &train, opts, OperatingTarget::MaxFpr(0.01));
    assert!(strict.fpr <= 0.01);
    let sensitive = line_search_threshold(&kf, &train, opts, OperatingTarget::MinTpr(0.99));
    assert!(sensitive.tpr >= 0.99);
    assert!(sensitive.threshold <= strict.threshold);

    let youden = line_search_threshold(&kf, &train, opts, OperatingTarget::Youden);
    assert_eq!(youden.threshold, optimize_threshold(&kf, &train, opts).best_threshold);
}

#[test]
fn transmission_level_collapses_receptions() {
    let s = Synth::default().scenario("a");
    let opts = CollectOptions { federate_only: true, transmission_level: true };
    let set = rid_eval::optimize::collect_scores(&PassThroughDetector, std::slice::from_ref(&s), opts);
    assert_eq!(set.len(), s.transmissions().len());

    let per_event = rid_eval::optimize::collect_scores(
        &PassThroughDetector,
        std::slice::from_ref(&s),
        CollectOptions { federate_only: true, transmission_level: false },
    );
    assert_eq!(per_event.len(), s.n_events() * 6 / 7);
}

// ── Train → test ──────────────────────────────────────────────────────────────

#[test]
fn train_then_test_with_multilateration_grid() {
    let train = vec![Synth::default().scenario("train-0")];
    let test = vec![
        Synth { seed: 11, ..Synth::default() }.scenario("test-0"),
        Synth { seed: 12, spoof_from_s: 100.0, ..Synth::default() }.scenario("test-1"),
    ];
    let mlat = DetectorKind::from(MultilatDetector { min_federates: 6, ..MultilatDetector::default() });
    let grid = ParamGrid::new().axis("path_loss_exp", [1.8, 2.0, 2.2]);

    let out = run_evaluation(&mlat, &train, &test, CollectOptions::default(), Some(&grid)).unwrap();
    // the generating exponent fits the noiseless data exactly
    assert!(out.optimization.best_auc > 0.99, "train auc {}", out.optimization.best_auc);
    let n = out.optimization.best_params["path_loss_exp"].as_f64().unwrap();
    assert!([1.8, 2.0, 2.2].contains(&n));
    assert_eq!(out.evaluation.threshold, out.optimization.best_threshold);
    assert_eq!(out.evaluation.params, out.optimization.best_params);
    // test-1 never spoofs, so only test-0 contributes a latency
    assert_eq!(out.evaluation.ttd_per_scenario.len(), 1);
    assert!(out.evaluation.ttd_per_scenario[0] >= 0.0);
    assert!(out.evaluation.metrics.auc > 0.95);
}

#[test]
fn evaluation_artifact_round_trips_through_json() {
    let train = vec![Synth::default().scenario("a")];
    let test = vec![Synth { seed: 99, ..Synth::default() }.scenario("b")];
    let kf = DetectorKind::from(PassThroughDetector);

    let out = run_evaluation(&kf, &train, &test, CollectOptions::default(), None).unwrap();
    let artifact = out.to_artifact(dataset_fingerprint(&train, &test), true);

    let json = serde_json::to_string_pretty(&artifact).unwrap();
    let back: ResultArtifact = serde_json::from_str(&json).unwrap();
    assert_eq!(back.evaluation.threshold, artifact.evaluation.threshold);
    assert_eq!(back.evaluation.metrics.auc, artifact.evaluation.metrics.auc);
    assert_eq!(back.evaluation.metrics.true_positives, artifact.evaluation.metrics.true_positives);
    assert_eq!(back.evaluation.metrics.false_positives, artifact.evaluation.metrics.false_positives);
    assert_eq!(back.dataset.digest, artifact.dataset.digest);
    assert!(back.optimization.roc.is_some());

    let compact = out.to_artifact(dataset_fingerprint(&train, &test), false);
    let json = serde_json::to_value(&compact).unwrap();
    assert!(json["evaluation"].get("roc").is_none());
}

#[test]
fn frozen_threshold_is_not_retuned_on_test() {
    let train = vec![Synth::default().scenario("a")];
    let test = vec![Synth { seed: 5, offset_m: 200.0, ..Synth::default() }.scenario("b")];
    let kf = PassThroughDetector;
    let opt = optimize_threshold(&kf, &train, CollectOptions::default());
    let eval = evaluate_detector(&kf, opt.best_threshold, &test, CollectOptions::default());
    assert_eq!(eval.threshold, opt.best_threshold);
    assert_eq!(eval.metrics.threshold, opt.best_threshold);
}

// ── Loading from disk ─────────────────────────────────────────────────────────

#[test]
fn dataset_directory_loads_in_name_order_with_limit() {
    let dir = tempfile::tempdir().unwrap();
    common::write_table(dir.path(), "b.csv", &Synth { seed: 2, ..Synth::default() }.events());
    common::write_table(dir.path(), "a.csv", &Synth { seed: 1, ..Synth::default() }.events());
    common::write_table(dir.path(), "c.csv", &Synth { seed: 3, ..Synth::default() }.events());
    std::fs::write(dir.path().join("notes.txt"), "not a table").unwrap();

    let scenarios = load_dataset(dir.path(), Some(2), 6).unwrap();
    let ids: Vec<&str> = scenarios.iter().map(|s| s.scenario_id()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let a = &scenarios[0];
    assert_eq!(a.federate_host_ids(), &[1, 2, 3, 4, 5, 6]);
    assert_eq!(a.n_events(), Synth::default().events().len());
    assert_eq!(a.n_spoofed(), Synth::default().events().iter().filter(|e| e.is_spoofed).count());

    // loaded and in-memory scenarios score identically
    let mem = Synth { seed: 1, ..Synth::default() }.scenario("a");
    let kf = PassThroughDetector;
    let loaded_scores = kf.score(a);
    let mem_scores = kf.score(&mem);
    assert!(loaded_scores.iter().zip(&mem_scores).all(|(x, y)| (x - y).abs() < 1e-9));
}

#[test]
fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(load_dataset(dir.path(), None, 4), Err(EvalError::EmptyDataset(_))));
}
