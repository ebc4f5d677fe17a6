//! detectors/ — Spoofing detectors
//!
//! Every detector maps a scenario to one score per RX event (higher ⇒ more
//! likely spoofed). Scores are a pure function of the scenario and the
//! detector parameters; no state survives a `score` call.

pub mod multilat;
pub mod pass_through;
pub mod tx_power;

use rid_types::ParamMap;

use crate::error::{EvalError, Result};
use crate::scenario::Scenario;

pub use multilat::MultilatDetector;
pub use pass_through::PassThroughDetector;
pub use tx_power::TxPowerDetector;

pub trait Detector {
    /// Name written into result artifacts.
    fn name(&self) -> &'static str;

    /// Current hyper-parameters.
    fn params(&self) -> ParamMap;

    /// One score per event of `scenario`, in event order.
    fn score(&self, scenario: &Scenario) -> Vec<f64>;

    fn detect(&self, scenario: &Scenario, threshold: f64) -> Vec<bool> {
        self.score(scenario).into_iter().map(|s| s >= threshold).collect()
    }
}

/// The concrete detectors, dispatched without trait objects.
#[derive(Debug, Clone)]
pub enum DetectorKind {
    PassThrough(PassThroughDetector),
    Multilateration(MultilatDetector),
    TxPower(TxPowerDetector),
}

impl DetectorKind {
    /// CLI short name (`kf`, `mlat`, `txp`) or artifact name, with default parameters.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "kf" | "KalmanFilter" => Some(Self::PassThrough(PassThroughDetector)),
            "mlat" | "Multilateration" => Some(Self::Multilateration(MultilatDetector::default())),
            "txp" | "TxPowerConsistency" => Some(Self::TxPower(TxPowerDetector::default())),
            _ => None,
        }
    }

    /// Same detector kind, parameters overridden by `params`.
    pub fn with_params(&self, params: &ParamMap) -> Result<Self> {
        Ok(match self {
            Self::PassThrough(_) => {
                if let Some(name) = params.keys().next() {
                    return Err(EvalError::UnknownParameter { detector: self.name(), name: name.clone() });
                }
                Self::PassThrough(PassThroughDetector)
            }
            Self::Multilateration(d) => Self::Multilateration(d.with_params(params)?),
            Self::TxPower(d) => Self::TxPower(d.with_params(params)?),
        })
    }
}

impl Detector for DetectorKind {
    fn name(&self) -> &'static str {
        match self {
            Self::PassThrough(d) => d.name(),
            Self::Multilateration(d) => d.name(),
            Self::TxPower(d) => d.name(),
        }
    }

    fn params(&self) -> ParamMap {
        match self {
            Self::PassThrough(d) => d.params(),
            Self::Multilateration(d) => d.params(),
            Self::TxPower(d) => d.params(),
        }
    }

    fn score(&self, scenario: &Scenario) -> Vec<f64> {
        match self {
            Self::PassThrough(d) => d.score(scenario),
            Self::Multilateration(d) => d.score(scenario),
            Self::TxPower(d) => d.score(scenario),
        }
    }
}

impl From<MultilatDetector> for DetectorKind {
    fn from(d: MultilatDetector) -> Self { Self::Multilateration(d) }
}

impl From<TxPowerDetector> for DetectorKind {
    fn from(d: TxPowerDetector) -> Self { Self::TxPower(d) }
}

impl From<PassThroughDetector> for DetectorKind {
    fn from(d: PassThroughDetector) -> Self { Self::PassThrough(d) }
}

/// Read a float parameter; integers are accepted.
pub(crate) fn param_f64(name: &str, value: &rid_types::ParamValue) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EvalError::invalid_param(name, format!("expected a number, got {value}")))
}

pub(crate) fn param_usize(name: &str, value: &rid_types::ParamValue) -> Result<usize> {
    value
        .as_usize()
        .ok_or_else(|| EvalError::invalid_param(name, format!("expected a non-negative integer, got {value}")))
}

pub(crate) fn param_bool(name: &str, value: &rid_types::ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| EvalError::invalid_param(name, format!("expected true/false, got {value}")))
}
