//! multilateration.rs — Joint position / transmit-power solver from RSSI
//!
//! Log-distance path-loss model, one measurement per federate receiver:
//!   RSSI_i = P − 10·n·log10(max(‖pos − rx_i‖, 0.1))
//!
//! Unknowns θ = (x, y, z, P). Minimizes  F(θ) = ½ Σ r_i²  with
//!   r_i = RSSI_i − (P − 10·n·log10(d_i))
//! by Levenberg-Marquardt on the 4×4 normal equations, with P projected onto
//! [power_min, power_max] after every step. Position is unbounded.
//!
//! The solver never panics and never errors: a fit that neither converges nor
//! reaches `acceptance_cost` is reported as "no estimate".

use std::f64::consts::LN_10;

use nalgebra::{Matrix4, Vector3, Vector4};
use rid_types::Vec3;
use serde::Serialize;

use crate::metrics::median;

/// Distances are floored here before taking the log.
pub const MIN_DISTANCE_M: f64 = 0.1;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One federate's view of a transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RssiMeasurement {
    pub rx_pos: Vec3,
    pub rssi_dbm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Function evaluations, initial point included
    pub max_iterations: usize,
    /// Accept a non-converged fit whose ½Σr² (dB²) is below this
    pub acceptance_cost: f64,
    pub power_min_dbm: f64,
    pub power_max_dbm: f64,
    /// Relative cost reduction, step size and gradient tolerances
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            acceptance_cost: 100.0,
            power_min_dbm: -50.0,
            power_max_dbm: 50.0,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
        }
    }
}

/// Raw solver output, before the acceptance rule is applied.
#[derive(Debug, Clone, Serialize)]
pub struct MultilaterationResult {
    pub position: Vec3,
    pub tx_power_dbm: f64,
    /// ½Σr² at `position`, dB²
    pub cost: f64,
    /// Function evaluations used
    pub iterations: u32,
    pub converged: bool,
    pub n_measurements: u32,
}

/// An accepted fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub position: Vec3,
    pub tx_power_dbm: f64,
    pub cost: f64,
}

// ── Model ─────────────────────────────────────────────────────────────────────

/// Cost plus normal-equation terms JᵀJ and Jᵀr at θ.
struct Linearization {
    cost: f64,
    jtj:  Matrix4<f64>,
    jtr:  Vector4<f64>,
}

fn to_vector(v: Vec3) -> Vector3<f64> { Vector3::new(v.x, v.y, v.z) }

fn cost_at(theta: &Vector4<f64>, measurements: &[RssiMeasurement], slope: f64) -> f64 {
    let pos = theta.fixed_rows::<3>(0).into_owned();
    let power = theta[3];
    0.5 * measurements
        .iter()
        .map(|m| {
            let d = (pos - to_vector(m.rx_pos)).norm().max(MIN_DISTANCE_M);
            let r = m.rssi_dbm - (power - slope * d.log10());
            r * r
        })
        .sum::<f64>()
}

fn linearize(theta: &Vector4<f64>, measurements: &[RssiMeasurement], slope: f64) -> Linearization {
    let pos = theta.fixed_rows::<3>(0).into_owned();
    let power = theta[3];
    let mut jtj = Matrix4::zeros();
    let mut jtr = Vector4::zeros();
    let mut cost = 0.0;

    for m in measurements {
        let diff = pos - to_vector(m.rx_pos);
        let d = diff.norm();
        let r = m.rssi_dbm - (power - slope * d.max(MIN_DISTANCE_M).log10());
        cost += 0.5 * r * r;

        // ∂r/∂pos vanishes inside the distance floor
        let grad_pos = if d > MIN_DISTANCE_M {
            diff * (slope / (d * d * LN_10))
        } else {
            Vector3::zeros()
        };
        let j = Vector4::new(grad_pos.x, grad_pos.y, grad_pos.z, -1.0);
        jtj += j * j.transpose();
        jtr += j * r;
    }

    Linearization { cost, jtj, jtr }
}

/// Gradient with the P component dropped when the bound blocks descent.
fn projected_gradient_norm(g: &Vector4<f64>, power: f64, cfg: &SolverConfig) -> f64 {
    let mut g = *g;
    if (power <= cfg.power_min_dbm && g[3] > 0.0) || (power >= cfg.power_max_dbm && g[3] < 0.0) {
        g[3] = 0.0;
    }
    g.amax()
}

/// Initial transmit power: median of the per-receiver implied powers at `claimed`.
pub fn initial_power(measurements: &[RssiMeasurement], claimed: Vec3, path_loss_exp: f64) -> f64 {
    let slope = 10.0 * path_loss_exp;
    let implied: Vec<f64> = measurements
        .iter()
        .map(|m| m.rssi_dbm + slope * claimed.dist(&m.rx_pos).max(MIN_DISTANCE_M).log10())
        .collect();
    median(&implied).unwrap_or(0.0)
}

// ── Solve ─────────────────────────────────────────────────────────────────────

/// Fit (x, y, z, P) starting from the claimed position.
///
/// Returns `None` when there are fewer measurements than unknowns.
pub fn solve(
    measurements: &[RssiMeasurement],
    claimed: Vec3,
    path_loss_exp: f64,
    cfg: &SolverConfig,
) -> Option<MultilaterationResult> {
    if measurements.len() < 4 {
        return None;
    }
    let slope = 10.0 * path_loss_exp;
    let p0 = initial_power(measurements, claimed, path_loss_exp)
        .clamp(cfg.power_min_dbm, cfg.power_max_dbm);
    let mut theta = Vector4::new(claimed.x, claimed.y, claimed.z, p0);

    let mut lin = linearize(&theta, measurements, slope);
    let mut nfev: usize = 1;
    let mut converged = false;
    let mut lambda = 1e-3 * lin.jtj.diagonal().max().max(1e-12);

    while nfev < cfg.max_iterations {
        if lin.cost == 0.0 || projected_gradient_norm(&lin.jtr, theta[3], cfg) < cfg.gtol {
            converged = true;
            break;
        }

        // Marquardt damping scaled by the curvature of each unknown
        let mut damped = lin.jtj;
        for k in 0..4 {
            damped[(k, k)] += lambda * lin.jtj[(k, k)].max(1e-12);
        }
        let Some(step) = damped.lu().solve(&(-lin.jtr)) else {
            lambda *= 10.0;
            if lambda > 1e16 {
                break;
            }
            continue;
        };

        let mut candidate = theta + step;
        candidate[3] = candidate[3].clamp(cfg.power_min_dbm, cfg.power_max_dbm);
        let actual_step = candidate - theta;

        let new_cost = cost_at(&candidate, measurements, slope);
        nfev += 1;

        if new_cost.is_finite() && new_cost < lin.cost {
            let reduction = lin.cost - new_cost;
            let old_cost = lin.cost;
            let small_step = actual_step.norm() < cfg.xtol * (cfg.xtol + theta.norm());
            theta = candidate;
            lin = linearize(&theta, measurements, slope);
            lambda = (lambda / 10.0).max(1e-15);
            if reduction < cfg.ftol * old_cost || small_step {
                converged = true;
                break;
            }
        } else {
            lambda *= 10.0;
            if !lambda.is_finite() || lambda > 1e16 {
                break;
            }
        }
    }

    Some(MultilaterationResult {
        position: Vec3::new(theta[0], theta[1], theta[2]),
        tx_power_dbm: theta[3],
        cost: lin.cost,
        iterations: nfev as u32,
        converged,
        n_measurements: measurements.len() as u32,
    })
}

/// Solve and apply the acceptance rule: converged, or cost below `acceptance_cost`.
pub fn estimate(
    measurements: &[RssiMeasurement],
    claimed: Vec3,
    path_loss_exp: f64,
    cfg: &SolverConfig,
) -> Option<Estimate> {
    let result = solve(measurements, claimed, path_loss_exp, cfg)?;
    let finite = result.position.to_array().iter().all(|v| v.is_finite()) && result.cost.is_finite();
    if finite && (result.converged || result.cost < cfg.acceptance_cost) {
        Some(Estimate { position: result.position, tx_power_dbm: result.tx_power_dbm, cost: result.cost })
    } else {
        None
    }
}
