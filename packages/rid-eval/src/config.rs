//! config.rs — Evaluation configuration (config.toml)
//!
//! Every section and field is optional; missing values fall back to the
//! detector defaults so an empty file is a valid config.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::detectors::multilat::MultilatDetector;
use crate::detectors::tx_power::TxPowerDetector;
use crate::error::Result;

/// Built-in configuration used when no config file is found.
pub const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub dataset:         DatasetConfig,
    pub multilateration: MultilatConfig,
    pub tx_power:        TxPowerConfig,
    pub grid:            GridConfig,
    pub output:          OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Benign hosts designated as federates per scenario
    pub num_federates: usize,
    /// Score only events received by federates
    pub federate_only: bool,
    /// Collapse events to one sample per transmission before computing metrics
    pub transmission_level: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self { num_federates: 4, federate_only: false, transmission_level: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MultilatConfig {
    pub path_loss_exp:        f64,
    pub min_federates:        usize,
    pub kf_process_noise:     f64,
    pub kf_measurement_noise: f64,
    pub use_filtered_error:   bool,
    /// Accept a non-converged fit when ½Σr² is below this (dB²)
    pub acceptance_cost:      f64,
    pub max_iterations:       usize,
}

impl Default for MultilatConfig {
    fn default() -> Self {
        let d = MultilatDetector::default();
        Self {
            path_loss_exp: d.path_loss_exp,
            min_federates: d.min_federates,
            kf_process_noise: d.kf_process_noise,
            kf_measurement_noise: d.kf_measurement_noise,
            use_filtered_error: d.use_filtered_error,
            acceptance_cost: d.solver.acceptance_cost,
            max_iterations: d.solver.max_iterations,
        }
    }
}

impl MultilatConfig {
    pub fn detector(&self) -> MultilatDetector {
        let mut d = MultilatDetector {
            path_loss_exp: self.path_loss_exp,
            min_federates: self.min_federates,
            kf_process_noise: self.kf_process_noise,
            kf_measurement_noise: self.kf_measurement_noise,
            use_filtered_error: self.use_filtered_error,
            ..MultilatDetector::default()
        };
        d.solver.acceptance_cost = self.acceptance_cost;
        d.solver.max_iterations = self.max_iterations;
        d
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TxPowerConfig {
    pub path_loss_exp:     f64,
    pub frequency_mhz:     f64,
    pub process_noise:     f64,
    pub measurement_noise: f64,
}

impl Default for TxPowerConfig {
    fn default() -> Self {
        let d = TxPowerDetector::default();
        Self {
            path_loss_exp: d.path_loss_exp,
            frequency_mhz: d.frequency_mhz,
            process_noise: d.process_noise,
            measurement_noise: d.measurement_noise,
        }
    }
}

impl TxPowerConfig {
    pub fn detector(&self) -> TxPowerDetector {
        TxPowerDetector {
            path_loss_exp: self.path_loss_exp,
            frequency_mhz: self.frequency_mhz,
            process_noise: self.process_noise,
            measurement_noise: self.measurement_noise,
        }
    }
}

/// Candidate values for the multilateration grid search.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub path_loss_exp: Vec<f64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { path_loss_exp: vec![1.6, 1.8, 2.0, 2.2, 2.4, 2.6, 2.8, 3.0] }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Keep ROC arrays in the artifacts (plotting) instead of compact archival output
    pub include_curves: bool,
}

impl EvalConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, falling back to the built-in config when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                info!("Loaded config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) => {
                warn!("Config {} not readable ({e}), using built-in defaults", path.display());
                Self::from_toml(DEFAULT_CONFIG)
            }
        }
    }
}
