//! optimize.rs — Threshold selection and hyper-parameter grid search
//!
//! Training scores of all scenarios are pooled into one [`ScoreSet`]; the
//! operating threshold is picked on its ROC curve (Youden's J by default).
//! Nothing here ever looks at test data.

use rid_types::{OptimizationRecord, ParamMap, ParamValue};
use tracing::{debug, info};

use crate::detectors::Detector;
use crate::error::{EvalError, Result};
use crate::metrics::{compute_roc_auc, confusion_at_threshold, RocCurve};
use crate::scenario::Scenario;

// ── Pooled scores ─────────────────────────────────────────────────────────────

/// Which samples enter the pooled score set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOptions {
    /// Only events received by a federate
    pub federate_only: bool,
    /// One sample per transmission: max score, any-spoofed label, earliest time
    pub transmission_level: bool,
}

/// Parallel score / label / time arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSet {
    pub scores: Vec<f64>,
    pub labels: Vec<bool>,
    pub times:  Vec<f64>,
}

impl ScoreSet {
    pub fn len(&self) -> usize { self.scores.len() }
    pub fn is_empty(&self) -> bool { self.scores.is_empty() }

    pub fn push(&mut self, score: f64, label: bool, time: f64) {
        self.scores.push(score);
        self.labels.push(label);
        self.times.push(time);
    }

    pub fn extend(&mut self, other: ScoreSet) {
        self.scores.extend(other.scores);
        self.labels.extend(other.labels);
        self.times.extend(other.times);
    }

    pub fn n_positive(&self) -> usize { self.labels.iter().filter(|&&l| l).count() }
}

/// Samples of one scenario for already-computed per-event `scores`.
pub fn scenario_samples(scenario: &Scenario, scores: &[f64], opts: CollectOptions) -> ScoreSet {
    let labels = scenario.is_spoofed();
    let times = scenario.time();
    let included = |i: usize| !opts.federate_only || scenario.is_federate(scenario.host_id()[i]);

    let mut set = ScoreSet::default();
    if opts.transmission_level {
        for indices in scenario.transmissions().into_values() {
            let mut sample: Option<(f64, bool, f64)> = None;
            for i in indices.into_iter().filter(|&i| included(i)) {
                sample = Some(match sample {
                    None => (scores[i], labels[i], times[i]),
                    Some((s, l, t)) => (s.max(scores[i]), l || labels[i], t.min(times[i])),
                });
            }
            if let Some((s, l, t)) = sample {
                set.push(s, l, t);
            }
        }
    } else {
        for i in (0..scenario.n_events()).filter(|&i| included(i)) {
            set.push(scores[i], labels[i], times[i]);
        }
    }
    set
}

/// Score every scenario and pool the samples.
pub fn collect_scores<D: Detector + ?Sized>(detector: &D, scenarios: &[Scenario], opts: CollectOptions) -> ScoreSet {
    let mut pooled = ScoreSet::default();
    for s in scenarios {
        let scores = detector.score(s);
        pooled.extend(scenario_samples(s, &scores, opts));
    }
    pooled
}

// ── Threshold optimization ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub detector_name:  String,
    pub best_threshold: f64,
    pub best_auc:       f64,
    pub best_params:    ParamMap,
    pub roc:            RocCurve,
}

impl OptimizationResult {
    /// Lowest threshold whose FPR stays within `target`; the highest threshold if none does.
    pub fn find_threshold_for_fpr(&self, target: f64) -> f64 {
        let roc = &self.roc;
        roc.fpr
            .iter()
            .rposition(|&f| f <= target)
            .map(|i| roc.thresholds[i])
            .unwrap_or_else(|| roc.thresholds.first().copied().unwrap_or(0.0))
    }

    /// Highest threshold reaching `target` TPR; the lowest threshold if none does.
    pub fn find_threshold_for_tpr(&self, target: f64) -> f64 {
        let roc = &self.roc;
        roc.tpr
            .iter()
            .position(|&t| t >= target)
            .map(|i| roc.thresholds[i])
            .unwrap_or_else(|| roc.thresholds.last().copied().unwrap_or(0.0))
    }

    pub fn to_record(&self, include_curve: bool) -> OptimizationRecord {
        OptimizationRecord {
            detector_name: self.detector_name.clone(),
            best_threshold: self.best_threshold,
            best_auc: self.best_auc,
            best_params: self.best_params.clone(),
            roc: include_curve.then(|| self.roc.to_record()),
        }
    }
}

/// Index of the first maximum of Youden's J = TPR − FPR.
pub fn youden_index(roc: &RocCurve) -> usize {
    let mut best = 0;
    let mut best_j = f64::NEG_INFINITY;
    for (i, (t, f)) in roc.tpr.iter().zip(&roc.fpr).enumerate() {
        let j = t - f;
        if j > best_j {
            best_j = j;
            best = i;
        }
    }
    best
}

/// ROC and Youden-optimal threshold of an already pooled score set.
pub fn optimize_scores(detector_name: &str, params: ParamMap, set: &ScoreSet) -> OptimizationResult {
    let roc = compute_roc_auc(&set.scores, &set.labels);
    let best_threshold = roc.thresholds.get(youden_index(&roc)).copied().unwrap_or(0.0);
    OptimizationResult {
        detector_name: detector_name.to_string(),
        best_threshold,
        best_auc: roc.auc,
        best_params: params,
        roc,
    }
}

pub fn optimize_threshold<D: Detector + ?Sized>(
    detector: &D,
    scenarios: &[Scenario],
    opts: CollectOptions,
) -> OptimizationResult {
    let set = collect_scores(detector, scenarios, opts);
    let result = optimize_scores(detector.name(), detector.params(), &set);
    info!(
        "{}: trained on {} samples ({} spoofed), AUC {:.4}, threshold {:.4}",
        result.detector_name, set.len(), set.n_positive(), result.best_auc, result.best_threshold
    );
    result
}

// ── Operating-point line search ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingTarget {
    /// Maximize TPR − FPR
    Youden,
    /// Most sensitive threshold with FPR ≤ x
    MaxFpr(f64),
    /// Least sensitive threshold with TPR ≥ x
    MinTpr(f64),
}

/// A chosen threshold and the rates it actually achieves on the training set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint {
    pub threshold: f64,
    pub tpr: f64,
    pub fpr: f64,
}

pub fn line_search_threshold<D: Detector + ?Sized>(
    detector: &D,
    scenarios: &[Scenario],
    opts: CollectOptions,
    target: OperatingTarget,
) -> OperatingPoint {
    let set = collect_scores(detector, scenarios, opts);
    let opt = optimize_scores(detector.name(), detector.params(), &set);
    let threshold = match target {
        OperatingTarget::Youden => opt.best_threshold,
        OperatingTarget::MaxFpr(x) => opt.find_threshold_for_fpr(x),
        OperatingTarget::MinTpr(x) => opt.find_threshold_for_tpr(x),
    };
    let c = confusion_at_threshold(&set.scores, &set.labels, threshold);
    OperatingPoint { threshold, tpr: c.tpr(), fpr: c.fpr() }
}

// ── Grid search ───────────────────────────────────────────────────────────────

/// Ordered parameter axes; the last axis varies fastest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self { Self::default() }

    pub fn axis(mut self, name: impl Into<String>, values: impl IntoIterator<Item = impl Into<ParamValue>>) -> Self {
        self.axes.push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Cartesian product in odometer order. An empty grid yields one empty map.
    pub fn combinations(&self) -> Vec<ParamMap> {
        let mut combos = vec![ParamMap::new()];
        for (name, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |v| {
                        let mut m = base.clone();
                        m.insert(name.clone(), *v);
                        m
                    })
                })
                .collect();
        }
        combos
    }
}

#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best: OptimizationResult,
    /// Every combination tried with its training AUC, in evaluation order
    pub trials: Vec<(ParamMap, f64)>,
}

/// Build a detector per combination, optimize its threshold on `scenarios`,
/// keep the strictly highest AUC (earliest wins ties).
pub fn grid_search<D, F>(
    factory: F,
    grid: &ParamGrid,
    scenarios: &[Scenario],
    opts: CollectOptions,
) -> Result<GridSearchResult>
where
    D: Detector,
    F: Fn(&ParamMap) -> Result<D>,
{
    let combos = grid.combinations();
    let mut best: Option<OptimizationResult> = None;
    let mut best_auc = -1.0;
    let mut trials = Vec::with_capacity(combos.len());

    for (k, params) in combos.into_iter().enumerate() {
        let detector = factory(&params)?;
        let result = optimize_threshold(&detector, scenarios, opts);
        debug!("grid {k}: {params:?} → AUC {:.4}", result.best_auc);
        trials.push((params, result.best_auc));
        if result.best_auc > best_auc {
            best_auc = result.best_auc;
            best = Some(result);
        }
    }

    let best = best.ok_or_else(|| EvalError::invalid_param("grid", "no parameter combinations to evaluate"))?;
    info!(
        "Grid search: {} combination(s), best AUC {:.4} with {:?}",
        trials.len(), best.best_auc, best.best_params
    );
    Ok(GridSearchResult { best, trials })
}
