//! pass_through.rs — Reads the simulator's precomputed single-receiver NIS

use rid_types::ParamMap;

use super::Detector;
use crate::scenario::Scenario;

/// Score = the event's `kf_nis` column; missing or NaN values score 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughDetector;

impl Detector for PassThroughDetector {
    fn name(&self) -> &'static str { "KalmanFilter" }

    fn params(&self) -> ParamMap { ParamMap::new() }

    fn score(&self, scenario: &Scenario) -> Vec<f64> {
        scenario
            .kf_nis()
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()).unwrap_or(0.0))
            .collect()
    }
}
