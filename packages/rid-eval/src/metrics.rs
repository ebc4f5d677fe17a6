//! metrics.rs — ROC/AUC, confusion counts and time-to-detection
//!
//! Inputs are parallel slices: `scores[i]`, `labels[i]` (true = spoofed) and,
//! for latency, `times[i]`. A sample is flagged when `score >= threshold`.

use rid_types::{MetricsRecord, RocRecord};

/// Median, averaging the two middle values for even lengths. `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 { (v[mid - 1] + v[mid]) / 2.0 } else { v[mid] })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ── ROC ───────────────────────────────────────────────────────────────────────

/// ROC curve, one point per distinct score (descending thresholds).
///
/// Point 0 is always `(0, 0)` at threshold `max score + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
    pub auc: f64,
}

impl RocCurve {
    /// Curve for a label set with no positives or no negatives.
    fn degenerate(scores: &[f64]) -> Self {
        let (max, min) = if scores.is_empty() {
            (0.0, 0.0)
        } else {
            scores.iter().fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), &s| (hi.max(s), lo.min(s)))
        };
        Self { fpr: vec![0.0, 1.0], tpr: vec![0.0, 1.0], thresholds: vec![max, min], auc: 0.5 }
    }

    pub fn len(&self) -> usize { self.thresholds.len() }
    pub fn is_empty(&self) -> bool { self.thresholds.is_empty() }

    pub fn to_record(&self) -> RocRecord {
        RocRecord { fpr: self.fpr.clone(), tpr: self.tpr.clone(), thresholds: self.thresholds.clone() }
    }
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| (xw[1] - xw[0]) * (yw[1] + yw[0]) / 2.0)
        .sum()
}

pub fn compute_roc_auc(scores: &[f64], labels: &[bool]) -> RocCurve {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return RocCurve::degenerate(scores);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let max_score = scores[order[0]];
    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![max_score + 1.0];

    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &i) in order.iter().enumerate() {
        if labels[i] { tp += 1 } else { fp += 1 }
        // Ties collapse: emit only after the last sample of a score value
        let last_of_value = order.get(k + 1).map_or(true, |&j| scores[j] != scores[i]);
        if last_of_value {
            fpr.push(fp as f64 / n_neg as f64);
            tpr.push(tp as f64 / n_pos as f64);
            thresholds.push(scores[i]);
        }
    }

    let auc = trapezoid(&fpr, &tpr);
    RocCurve { fpr, tpr, thresholds, auc }
}

// ── Confusion matrix ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub tp: u64,
    pub tn: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl Confusion {
    pub fn total(&self) -> u64 { self.tp + self.tn + self.fp + self.fn_ }

    pub fn tpr(&self) -> f64 {
        let p = self.tp + self.fn_;
        if p == 0 { 0.0 } else { self.tp as f64 / p as f64 }
    }

    pub fn fpr(&self) -> f64 {
        let n = self.fp + self.tn;
        if n == 0 { 0.0 } else { self.fp as f64 / n as f64 }
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { (self.tp + self.tn) as f64 / total as f64 }
    }
}

pub fn confusion_at_threshold(scores: &[f64], labels: &[bool], threshold: f64) -> Confusion {
    let mut c = Confusion::default();
    for (&s, &l) in scores.iter().zip(labels) {
        match (s >= threshold, l) {
            (true, true) => c.tp += 1,
            (true, false) => c.fp += 1,
            (false, true) => c.fn_ += 1,
            (false, false) => c.tn += 1,
        }
    }
    c
}

// ── Latency ───────────────────────────────────────────────────────────────────

/// Earliest true-positive time minus earliest positive time.
///
/// `None` when there are no positives or none of them is flagged.
pub fn time_to_detection(scores: &[f64], labels: &[bool], times: &[f64], threshold: f64) -> Option<f64> {
    let mut first_positive: Option<f64> = None;
    let mut first_detection: Option<f64> = None;
    for ((&s, &l), &t) in scores.iter().zip(labels).zip(times) {
        if !l {
            continue;
        }
        first_positive = Some(first_positive.map_or(t, |f| f.min(t)));
        if s >= threshold {
            first_detection = Some(first_detection.map_or(t, |f| f.min(t)));
        }
    }
    Some(first_detection? - first_positive?)
}

/// Threshold-dependent metrics plus the threshold-free AUC.
pub fn compute_metrics(scores: &[f64], labels: &[bool], times: &[f64], threshold: f64) -> MetricsRecord {
    let roc = compute_roc_auc(scores, labels);
    let c = confusion_at_threshold(scores, labels, threshold);
    MetricsRecord {
        auc: roc.auc,
        fpr: c.fpr(),
        tpr: c.tpr(),
        threshold,
        time_to_detection: time_to_detection(scores, labels, times, threshold),
        true_positives: c.tp,
        true_negatives: c.tn,
        false_positives: c.fp,
        false_negatives: c.fn_,
        accuracy: c.accuracy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_separation_has_unit_auc() {
        let roc = compute_roc_auc(&[0.9, 0.8, 0.2, 0.1], &[true, true, false, false]);
        assert!((roc.auc - 1.0).abs() < 1e-12);
        assert_eq!(roc.thresholds[0], 1.9);
        assert_eq!((roc.fpr[0], roc.tpr[0]), (0.0, 0.0));
        assert_eq!(roc.len(), 5);
    }

    #[test]
    fn inverted_scores_have_zero_auc() {
        let roc = compute_roc_auc(&[0.1, 0.2, 0.8, 0.9], &[true, true, false, false]);
        assert!(roc.auc.abs() < 1e-12);
    }

    #[test]
    fn tied_scores_collapse_to_one_point() {
        let roc = compute_roc_auc(&[0.5, 0.5, 0.5, 0.5], &[true, false, true, false]);
        assert_eq!(roc.len(), 2);
        assert_eq!(roc.fpr, vec![0.0, 1.0]);
        assert_eq!(roc.tpr, vec![0.0, 1.0]);
        assert!((roc.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_labels_give_half_auc() {
        let roc = compute_roc_auc(&[3.0, 1.0, 2.0], &[true, true, true]);
        assert_eq!(roc.auc, 0.5);
        assert_eq!(roc.thresholds, vec![3.0, 1.0]);

        let empty = compute_roc_auc(&[], &[]);
        assert_eq!(empty.auc, 0.5);
        assert_eq!(empty.thresholds, vec![0.0, 0.0]);
    }

    #[test]
    fn confusion_counts_and_rates() {
        let scores = [0.9, 0.4, 0.6, 0.1, 0.7];
        let labels = [true, true, false, false, false];
        let c = confusion_at_threshold(&scores, &labels, 0.5);
        assert_eq!(c, Confusion { tp: 1, tn: 1, fp: 2, fn_: 1 });
        assert_eq!(c.tpr(), 0.5);
        assert!((c.fpr() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.accuracy(), 0.4);

        let none = confusion_at_threshold(&[], &[], 0.0);
        assert_eq!((none.tpr(), none.fpr(), none.accuracy()), (0.0, 0.0, 0.0));
    }

    #[test]
    fn latency_from_first_spoof_to_first_hit() {
        let times = [5.0, 10.0, 11.0, 12.0, 13.0];
        let labels = [false, true, true, true, true];
        let scores = [9.0, 0.1, 0.2, 0.9, 0.95];
        assert_eq!(time_to_detection(&scores, &labels, &times, 0.5), Some(2.0));
        assert_eq!(time_to_detection(&scores, &labels, &times, 1.0), None);
        assert_eq!(time_to_detection(&scores, &[false; 5], &times, 0.0), None);
    }

    #[test]
    fn medians() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(mean(&[1.0, 2.0]), Some(1.5));
    }
}
