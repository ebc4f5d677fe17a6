//! tx_power.rs — Single-receiver transmit-power consistency detector
//!
//! Each receiver back-computes the transmit power implied by a message's
//! claimed position (free-space path loss, exponent n):
//!   P_tx = RSSI + 32.44 + 20·log10(f_MHz) + 10·n·log10(d_km)
//! A genuine transmitter keeps P_tx roughly constant; a spoofed position
//! makes it jump. One scalar Kalman filter per (receiver, serial) tracks P_tx
//! and the NIS of each update is the score.

use std::collections::HashMap;

use rid_types::{ParamMap, ParamValue, Vec3};

use super::{param_f64, Detector};
use crate::error::{EvalError, Result};
use crate::kalman::ScalarKalman;
use crate::scenario::Scenario;

/// Covariance of a freshly initialized filter, dB².
const INITIAL_COVARIANCE: f64 = 10.0;
/// Distance floor, meters.
const MIN_DISTANCE_M: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct TxPowerDetector {
    pub path_loss_exp:     f64,
    pub frequency_mhz:     f64,
    /// Q, dB²
    pub process_noise:     f64,
    /// R, dB²
    pub measurement_noise: f64,
}

impl Default for TxPowerDetector {
    fn default() -> Self {
        Self { path_loss_exp: 2.0, frequency_mhz: 2400.0, process_noise: 0.01, measurement_noise: 4.0 }
    }
}

impl TxPowerDetector {
    pub fn with_params(&self, params: &ParamMap) -> Result<Self> {
        let mut d = self.clone();
        for (name, value) in params {
            let v = param_f64(name, value)?;
            match name.as_str() {
                "path_loss_exp" => d.path_loss_exp = v,
                "frequency_mhz" => d.frequency_mhz = v,
                "process_noise" => d.process_noise = v,
                "measurement_noise" => d.measurement_noise = v,
                _ => {
                    return Err(EvalError::UnknownParameter { detector: "TxPowerConsistency", name: name.clone() })
                }
            }
        }
        if d.frequency_mhz <= 0.0 {
            return Err(EvalError::invalid_param("frequency_mhz", "must be positive"));
        }
        Ok(d)
    }

    /// Transmit power (dBm) implied by `rssi` at `rx` for a sender at `claimed`.
    pub fn implied_tx_power(&self, rssi: f64, rx: Vec3, claimed: Vec3) -> f64 {
        let d_km = rx.dist(&claimed).max(MIN_DISTANCE_M) / 1000.0;
        rssi + 32.44 + 20.0 * self.frequency_mhz.log10() + 10.0 * self.path_loss_exp * d_km.log10()
    }
}

impl Detector for TxPowerDetector {
    fn name(&self) -> &'static str { "TxPowerConsistency" }

    fn params(&self) -> ParamMap {
        [
            ("path_loss_exp", self.path_loss_exp),
            ("frequency_mhz", self.frequency_mhz),
            ("process_noise", self.process_noise),
            ("measurement_noise", self.measurement_noise),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ParamValue::Float(v)))
        .collect()
    }

    fn score(&self, scenario: &Scenario) -> Vec<f64> {
        let n = scenario.n_events();
        let mut scores = vec![0.0; n];

        // Stable: events at the same time keep table order
        let time = scenario.time();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| time[a].total_cmp(&time[b]));

        let mut filters: HashMap<(u32, u64), ScalarKalman> = HashMap::new();
        for i in order {
            let z = self.implied_tx_power(scenario.rssi()[i], scenario.rx_pos()[i], scenario.rid_pos()[i]);
            if !z.is_finite() {
                continue;
            }
            let key = (scenario.host_id()[i], scenario.serial_number()[i]);
            match filters.get_mut(&key) {
                Some(kf) => scores[i] = kf.update(z).nis,
                None => {
                    filters.insert(
                        key,
                        ScalarKalman::new(z, INITIAL_COVARIANCE, self.process_noise, self.measurement_noise),
                    );
                }
            }
        }
        scores
    }
}
