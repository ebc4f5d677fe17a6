//! multilat.rs — Multilateration position-consistency detector
//!
//! Per transmission (ascending rid_timestamp, then serial):
//!   1. keep only federate receptions; fewer than `min_federates` ⇒ score 0
//!   2. solve (x, y, z, P) from federate RSSI, starting at the claimed position
//!   3. raw error = ‖estimate − claimed‖
//!   4. smooth raw error with a per-serial scalar Kalman filter
//!   5. broadcast the filtered error (or its NIS) to every reception
//!
//! Solver rejections and coverage gaps are not errors; they score 0 and are
//! counted in [`MultilatStats`].

use std::collections::HashMap;

use rid_types::{ParamMap, ParamValue};
use tracing::debug;

use super::{param_bool, param_f64, param_usize, Detector};
use crate::error::{EvalError, Result};
use crate::kalman::ScalarKalman;
use crate::multilateration::{self, RssiMeasurement, SolverConfig};
use crate::scenario::Scenario;

/// Initial state of every per-transmitter filter.
const KF_INITIAL_ESTIMATE: f64 = 0.0;
const KF_INITIAL_COVARIANCE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MultilatDetector {
    pub path_loss_exp:        f64,
    pub min_federates:        usize,
    pub kf_process_noise:     f64,
    pub kf_measurement_noise: f64,
    /// Score with the filtered error; otherwise with the filter's NIS
    pub use_filtered_error:   bool,
    pub solver:               SolverConfig,
}

impl Default for MultilatDetector {
    fn default() -> Self {
        Self {
            path_loss_exp: 2.0,
            min_federates: 4,
            kf_process_noise: 100.0,
            kf_measurement_noise: 250_000.0,
            use_filtered_error: true,
            solver: SolverConfig::default(),
        }
    }
}

/// Per-pass bookkeeping, logged after scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultilatStats {
    pub transmissions:  usize,
    pub scored:         usize,
    /// Too few federate receptions
    pub coverage_gaps:  usize,
    /// Solver gave no acceptable estimate
    pub rejected:       usize,
}

impl MultilatDetector {
    pub fn with_params(&self, params: &ParamMap) -> Result<Self> {
        let mut d = self.clone();
        for (name, value) in params {
            match name.as_str() {
                "path_loss_exp" => d.path_loss_exp = param_f64(name, value)?,
                "min_federates" => d.min_federates = param_usize(name, value)?,
                "kf_process_noise" => d.kf_process_noise = param_f64(name, value)?,
                "kf_measurement_noise" => d.kf_measurement_noise = param_f64(name, value)?,
                "use_filtered_error" => d.use_filtered_error = param_bool(name, value)?,
                "acceptance_cost" => d.solver.acceptance_cost = param_f64(name, value)?,
                "max_iterations" => d.solver.max_iterations = param_usize(name, value)?,
                _ => {
                    return Err(EvalError::UnknownParameter { detector: "Multilateration", name: name.clone() })
                }
            }
        }
        if d.path_loss_exp <= 0.0 {
            return Err(EvalError::invalid_param("path_loss_exp", "must be positive"));
        }
        Ok(d)
    }

    pub fn score_with_stats(&self, scenario: &Scenario) -> (Vec<f64>, MultilatStats) {
        let mut scores = vec![0.0; scenario.n_events()];
        let mut stats = MultilatStats::default();
        let mut filters: HashMap<u64, ScalarKalman> = HashMap::new();

        let rx_pos = scenario.rx_pos();
        let rssi = scenario.rssi();

        for (key, indices) in scenario.transmissions() {
            stats.transmissions += 1;

            let federate_idx: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| scenario.is_federate(scenario.host_id()[i]))
                .collect();
            if federate_idx.len() < self.min_federates || federate_idx.is_empty() {
                debug!(
                    "serial {} @ {} ms: {} federate reception(s), need {}",
                    key.serial_number, key.rid_timestamp, federate_idx.len(), self.min_federates
                );
                stats.coverage_gaps += 1;
                continue;
            }

            let measurements: Vec<RssiMeasurement> = federate_idx
                .iter()
                .map(|&i| RssiMeasurement { rx_pos: rx_pos[i], rssi_dbm: rssi[i] })
                .collect();
            let claimed = scenario.rid_pos()[federate_idx[0]];

            let Some(est) = multilateration::estimate(&measurements, claimed, self.path_loss_exp, &self.solver)
            else {
                stats.rejected += 1;
                continue;
            };

            let raw_error = est.position.dist(&claimed);
            let kf = filters.entry(key.serial_number).or_insert_with(|| {
                ScalarKalman::new(
                    KF_INITIAL_ESTIMATE,
                    KF_INITIAL_COVARIANCE,
                    self.kf_process_noise,
                    self.kf_measurement_noise,
                )
            });
            let step = kf.update(raw_error);
            let score = if self.use_filtered_error { step.estimate } else { step.nis };

            for &i in &indices {
                scores[i] = score;
            }
            stats.scored += 1;
        }

        debug!(
            "{}: {} transmissions, {} scored, {} coverage gaps, {} rejected fits",
            scenario.scenario_id(), stats.transmissions, stats.scored, stats.coverage_gaps, stats.rejected
        );
        (scores, stats)
    }
}

impl Detector for MultilatDetector {
    fn name(&self) -> &'static str { "Multilateration" }

    fn params(&self) -> ParamMap {
        let mut p = ParamMap::new();
        p.insert("path_loss_exp".into(), ParamValue::Float(self.path_loss_exp));
        p.insert("min_federates".into(), ParamValue::from(self.min_federates));
        p.insert("kf_process_noise".into(), ParamValue::Float(self.kf_process_noise));
        p.insert("kf_measurement_noise".into(), ParamValue::Float(self.kf_measurement_noise));
        p.insert("use_filtered_error".into(), ParamValue::Bool(self.use_filtered_error));
        p.insert("acceptance_cost".into(), ParamValue::Float(self.solver.acceptance_cost));
        p.insert("max_iterations".into(), ParamValue::from(self.solver.max_iterations));
        p
    }

    fn score(&self, scenario: &Scenario) -> Vec<f64> {
        self.score_with_stats(scenario).0
    }
}
