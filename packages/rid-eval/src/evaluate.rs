//! evaluate.rs — Train-then-test evaluation pipeline
//!
//! Training data picks the threshold (and optionally parameters); the frozen
//! detector is then applied once to the held-out test scenarios. Results are
//! packaged as `rid_types` records for the JSON artifacts.

use chrono::Utc;
use rid_types::{DatasetFingerprint, EvaluationRecord, MetricsRecord, ParamMap, ResultArtifact};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::detectors::{Detector, DetectorKind};
use crate::error::Result;
use crate::metrics::{compute_metrics, compute_roc_auc, mean, median, time_to_detection, RocCurve};
use crate::optimize::{
    grid_search, optimize_threshold, scenario_samples, CollectOptions, OptimizationResult, ParamGrid, ScoreSet,
};
use crate::scenario::Scenario;

// ── Test-phase result ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub detector_name: String,
    pub threshold:     f64,
    pub params:        ParamMap,
    pub metrics:       MetricsRecord,
    /// Defined per-scenario latencies, scenario order
    pub ttd_per_scenario: Vec<f64>,
    pub roc:           RocCurve,
}

impl EvaluationResult {
    pub fn mean_time_to_detection(&self) -> Option<f64> { mean(&self.ttd_per_scenario) }
    pub fn median_time_to_detection(&self) -> Option<f64> { median(&self.ttd_per_scenario) }

    pub fn to_record(&self, include_curve: bool) -> EvaluationRecord {
        EvaluationRecord {
            detector_name: self.detector_name.clone(),
            threshold: self.threshold,
            params: self.params.clone(),
            metrics: self.metrics.clone(),
            mean_time_to_detection: self.mean_time_to_detection(),
            median_time_to_detection: self.median_time_to_detection(),
            n_scenarios_with_ttd: self.ttd_per_scenario.len(),
            roc: include_curve.then(|| self.roc.to_record()),
        }
    }
}

/// Apply a frozen detector and threshold to test scenarios.
pub fn evaluate_detector<D: Detector + ?Sized>(
    detector: &D,
    threshold: f64,
    scenarios: &[Scenario],
    opts: CollectOptions,
) -> EvaluationResult {
    let mut pooled = ScoreSet::default();
    let mut ttd_per_scenario = Vec::new();

    for s in scenarios {
        let scores = detector.score(s);
        let samples = scenario_samples(s, &scores, opts);
        if s.n_spoofed() > 0 {
            if let Some(ttd) = time_to_detection(&samples.scores, &samples.labels, &samples.times, threshold) {
                ttd_per_scenario.push(ttd);
            }
        }
        pooled.extend(samples);
    }

    let metrics = compute_metrics(&pooled.scores, &pooled.labels, &pooled.times, threshold);
    let roc = compute_roc_auc(&pooled.scores, &pooled.labels);
    info!(
        "{}: tested on {} samples, AUC {:.4}, TPR {:.3}, FPR {:.3}, TTD in {} scenario(s)",
        detector.name(), pooled.len(), metrics.auc, metrics.tpr, metrics.fpr, ttd_per_scenario.len()
    );

    EvaluationResult {
        detector_name: detector.name().to_string(),
        threshold,
        params: detector.params(),
        metrics,
        ttd_per_scenario,
        roc,
    }
}

// ── Train → test ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub optimization: OptimizationResult,
    pub evaluation:   EvaluationResult,
}

impl RunOutcome {
    pub fn to_artifact(&self, dataset: DatasetFingerprint, include_curves: bool) -> ResultArtifact {
        ResultArtifact {
            generated_at: Utc::now(),
            dataset,
            optimization: self.optimization.to_record(include_curves),
            evaluation: self.evaluation.to_record(include_curves),
        }
    }
}

/// Optimize on `train` (grid search first when `grid` is given), then test the
/// frozen detector on `test`.
pub fn run_evaluation(
    detector: &DetectorKind,
    train: &[Scenario],
    test: &[Scenario],
    opts: CollectOptions,
    grid: Option<&ParamGrid>,
) -> Result<RunOutcome> {
    let (frozen, optimization) = match grid {
        Some(grid) => {
            let search = grid_search(|p| detector.with_params(p), grid, train, opts)?;
            let frozen = detector.with_params(&search.best.best_params)?;
            (frozen, search.best)
        }
        None => {
            let optimization = optimize_threshold(detector, train, opts);
            (detector.clone(), optimization)
        }
    };

    let evaluation = evaluate_detector(&frozen, optimization.best_threshold, test, opts);
    Ok(RunOutcome { optimization, evaluation })
}

// ── Provenance ────────────────────────────────────────────────────────────────

/// SHA-256 over every scenario id and its federate set, train then test.
pub fn dataset_fingerprint(train: &[Scenario], test: &[Scenario]) -> DatasetFingerprint {
    let mut hasher = Sha256::new();
    for (split, scenarios) in [("train", train), ("test", test)] {
        hasher.update(split.as_bytes());
        hasher.update(b"\n");
        for s in scenarios {
            let federates: Vec<String> = s.federate_host_ids().iter().map(u32::to_string).collect();
            hasher.update(s.scenario_id().as_bytes());
            hasher.update(b":");
            hasher.update(federates.join(",").as_bytes());
            hasher.update(b"\n");
        }
    }
    DatasetFingerprint {
        train_scenarios: train.len(),
        test_scenarios: test.len(),
        digest: hex::encode(hasher.finalize()),
    }
}
