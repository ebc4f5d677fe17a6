//! # rid-types
//!
//! Shared record structures for the Remote ID spoofing-detection toolchain.
//!
//! These types are used by:
//! - `rid-eval`: loading scenario event tables and writing evaluation artifacts
//! - report/plot tooling: parsing the JSON artifacts written by `rid-eval`
//!
//! ## Conventions
//!
//! - **Positions**: simulation-local Cartesian frame, meters (x, y, z)
//! - **RSSI / transmit power**: dBm
//! - **Event time**: simulation seconds; `rid_timestamp`: milliseconds since sim start
//! - A *transmission* is identified by `(serial_number, rid_timestamp)`

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Host classification ───────────────────────────────────────────────────────

/// Ground-truth class of a host as labeled in the event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostClass {
    /// Honest drone / ground receiver
    Benign,
    /// Host broadcasting falsified positions
    Spoofer,
    /// Benign host explicitly designated as a multilateration receiver
    Federate,
}

impl HostClass {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "benign" => Some(Self::Benign),
            "spoofer" => Some(Self::Spoofer),
            "federate" => Some(Self::Federate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Benign => "benign",
            Self::Spoofer => "spoofer",
            Self::Federate => "federate",
        }
    }
}

impl fmt::Display for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row type in the event table. Only `Rx` rows are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "TX")]
    Tx,
    #[serde(rename = "RX")]
    Rx,
}

impl EventType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "TX" => Some(Self::Tx),
            "RX" => Some(Self::Rx),
            _ => None,
        }
    }
}

// ── 3D Vector ─────────────────────────────────────────────────────────────────

/// 3D vector (meters)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }

    pub fn dist(&self, other: &Vec3) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    pub fn to_array(self) -> [f64; 3] { [self.x, self.y, self.z] }
}

// ── Reception record ──────────────────────────────────────────────────────────

/// Velocity claimed inside a Remote ID message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimedVelocity {
    /// m/s, positive = climbing
    pub vertical_mps: f64,
    pub horizontal_mps: f64,
    /// Degrees, 0 = north
    pub heading_deg: f64,
}

/// One RX row of the event table.
///
/// `host_class` and `is_spoofed` are ground truth: detectors must not read
/// them, they exist for labeling and federate designation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxEvent {
    /// Reception time, simulation seconds
    pub time: f64,
    /// Receiving host
    pub host_id: u32,
    pub host_class: HostClass,
    /// Transmitting host (as claimed in the message)
    pub serial_number: u64,
    /// Message timestamp, ms; with `serial_number` identifies the transmission
    pub rid_timestamp: i64,
    /// Receiver's own position
    pub rx_pos: Vec3,
    /// Position claimed in the received message
    pub rid_pos: Vec3,
    pub rid_velocity: Option<ClaimedVelocity>,
    /// Received signal strength, dBm
    pub rssi: f64,
    pub is_spoofed: bool,
    /// Single-receiver Kalman NIS computed by the simulator, when exported
    pub kf_nis: Option<f64>,
}

// ── Transmission key ──────────────────────────────────────────────────────────

/// One broadcast: every reception of it shares this key.
/// Ordered by message time first so a sorted key list is a valid time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransmissionKey {
    pub rid_timestamp: i64,
    pub serial_number: u64,
}

impl TransmissionKey {
    pub fn new(serial_number: u64, rid_timestamp: i64) -> Self {
        Self { rid_timestamp, serial_number }
    }
}

// ── Detector parameters ───────────────────────────────────────────────────────

/// A single detector hyper-parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Int(v) => Some(v as f64),
            Self::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Non-negative integers only; floats with no fractional part are accepted.
    pub fn as_usize(&self) -> Option<usize> {
        match *self {
            Self::Int(v) if v >= 0 => Some(v as usize),
            Self::Float(v) if v >= 0.0 && v.fract() == 0.0 => Some(v as usize),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self { Self::Int(v as i64) }
}

/// Named detector parameters. Sorted so artifacts are byte-stable.
pub type ParamMap = BTreeMap<String, ParamValue>;

// ── Evaluation artifacts (rid-eval → report tooling) ──────────────────────────

/// ROC curve arrays. Only present in "full" artifacts meant for plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocRecord {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Detection metrics at the operating threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub auc: f64,
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
    /// Seconds from first spoofed RX to first correct detection (pooled events)
    pub time_to_detection: Option<f64>,
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub accuracy: f64,
}

/// Output of the training phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub detector_name: String,
    pub best_threshold: f64,
    pub best_auc: f64,
    pub best_params: ParamMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc: Option<RocRecord>,
}

/// Output of the test phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub detector_name: String,
    pub threshold: f64,
    pub params: ParamMap,
    pub metrics: MetricsRecord,
    pub mean_time_to_detection: Option<f64>,
    pub median_time_to_detection: Option<f64>,
    pub n_scenarios_with_ttd: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc: Option<RocRecord>,
}

/// Identifies the exact train/test inputs, including federate membership,
/// so two artifacts can be checked for comparability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFingerprint {
    pub train_scenarios: usize,
    pub test_scenarios: usize,
    /// SHA-256 (hex) over scenario ids and federate host ids
    pub digest: String,
}

/// One `<detector>_results.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub generated_at: DateTime<Utc>,
    pub dataset: DatasetFingerprint,
    pub optimization: OptimizationRecord,
    pub evaluation: EvaluationRecord,
}
