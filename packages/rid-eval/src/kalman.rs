//! kalman.rs — Scalar (1-D) Kalman filter
//!
//! Random-walk state model: predict adds `q` to the covariance, update blends
//! in one scalar measurement with variance `r`. The normalized innovation
//! squared (NIS) of each update is the consistency statistic the detectors
//! score with.

/// Outcome of one predict/update cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanStep {
    /// ν²/S
    pub nis: f64,
    /// Post-update state
    pub estimate: f64,
    /// ν = z − x⁻
    pub innovation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarKalman {
    estimate:   f64,
    covariance: f64,
    q: f64,   // process noise
    r: f64,   // measurement noise
}

impl ScalarKalman {
    pub fn new(initial_estimate: f64, initial_covariance: f64, q: f64, r: f64) -> Self {
        Self { estimate: initial_estimate, covariance: initial_covariance, q, r }
    }

    pub fn estimate(&self) -> f64 { self.estimate }
    pub fn covariance(&self) -> f64 { self.covariance }

    pub fn update(&mut self, z: f64) -> KalmanStep {
        let x_prior = self.estimate;
        let p_prior = self.covariance + self.q;

        let innovation = z - x_prior;
        let s = p_prior + self.r;
        let nis = if s > 0.0 { innovation * innovation / s } else { 0.0 };
        let gain = if s > 0.0 { p_prior / s } else { 0.0 };

        self.estimate = x_prior + gain * innovation;
        self.covariance = (1.0 - gain) * p_prior;

        KalmanStep { nis, estimate: self.estimate, innovation }
    }
}
