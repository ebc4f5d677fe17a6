//! # rid-eval
//!
//! Offline detection of spoofed Remote ID position broadcasts and the
//! train/test harness used to compare detectors.
//!
//! Pipeline: [`scenario`] tables → [`detectors`] scores → [`metrics`] →
//! [`optimize`] (threshold on train) → [`evaluate`] (frozen, on test).
//!
//! The core is synchronous; the `rid-eval` binary adds concurrent loading
//! and artifact writing on top.

pub mod config;
pub mod detectors;
pub mod error;
pub mod evaluate;
pub mod kalman;
pub mod metrics;
pub mod multilateration;
pub mod optimize;
pub mod scenario;

pub use detectors::{Detector, DetectorKind};
pub use error::{EvalError, Result};
pub use scenario::Scenario;
