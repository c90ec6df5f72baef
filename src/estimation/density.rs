//! Risk-neutral density from the call-price curve (Breeden-Litzenberger) and
//! its tail probabilities.
//!
//! `q(K) = e^{rT} ∂²C/∂K²`, approximated by central second differences of
//! Black call prices on a uniform strike grid, then integrated with
//! composite Simpson.

use tracing::{debug, warn};

use super::config::DensityConfig;
use super::quadrature::{simpson, UniformGrid};
use crate::error::{RndError, Result};
use crate::models::bs::black_call_price;
use crate::models::smile::FittedSmile;

/// The density sampled on a grid `[lowest threshold, upper_bound]`.
#[derive(Debug, Clone)]
pub struct DensityCurve {
    pub grid: UniformGrid,
    pub values: Vec<f64>,
    tolerance: f64,
}

impl DensityCurve {
    /// Samples the density implied by `smile` from `lower` up to the
    /// configured upper bound.
    pub fn from_smile(
        smile: &FittedSmile,
        rate: f64,
        tau: f64,
        lower: f64,
        config: &DensityConfig,
    ) -> Result<Self> {
        let grid = UniformGrid::new(lower, config.upper_bound, config.grid_step)?;
        let h = grid.step;
        let price = |k: f64| -> Result<f64> {
            Ok(black_call_price(smile.forward, k, rate, tau, smile.vol(k)?))
        };

        // prices on the grid plus one node either side
        let mut prices = Vec::with_capacity(grid.node_count() + 2);
        prices.push(price(grid.lower - h)?);
        for k in grid.nodes() {
            prices.push(price(k)?);
        }
        prices.push(price(grid.upper() + h)?);

        let growth = (rate * tau).exp();
        let values: Vec<f64> = prices
            .windows(3)
            .map(|w| growth * (w[0] - 2.0 * w[1] + w[2]) / (h * h))
            .collect();

        if let Some(bad) = values.iter().position(|q| !q.is_finite()) {
            return Err(RndError::integration(format!(
                "non-finite density at strike {:.4}",
                grid.node(bad)
            )));
        }
        let negative = values.iter().filter(|q| **q < 0.0).count();
        if negative > 0 {
            debug!(negative, nodes = values.len(), "density negative on part of the grid");
        }
        Ok(Self {
            grid,
            values,
            tolerance: config.probability_tolerance,
        })
    }

    /// `P[threshold < S_T < upper_bound]`, the tail mass the grid can see.
    ///
    /// Values slightly outside [0, 1] are clamped; beyond the tolerance they
    /// are integration errors.
    pub fn tail_probability(&self, threshold: f64) -> Result<f64> {
        let start = self.grid.nearest_index(threshold).ok_or_else(|| {
            RndError::integration(format!(
                "threshold {threshold} outside density grid [{}, {}]",
                self.grid.lower,
                self.grid.upper()
            ))
        })?;
        let raw = simpson(&self.values[start..], self.grid.step);
        clamp_probability(raw, self.tolerance)
    }

    /// Integral of the density over the whole grid.
    pub fn mass(&self) -> f64 {
        simpson(&self.values, self.grid.step)
    }
}

pub(crate) fn clamp_probability(p: f64, tolerance: f64) -> Result<f64> {
    if !p.is_finite() {
        return Err(RndError::integration(format!("probability is {p}")));
    }
    if p < -tolerance || p > 1.0 + tolerance {
        return Err(RndError::integration(format!(
            "probability {p:.6} outside [0, 1] beyond tolerance {tolerance}"
        )));
    }
    let clamped = p.clamp(0.0, 1.0);
    if clamped != p {
        warn!(raw = p, clamped, "clamped probability into [0, 1]");
    }
    Ok(clamped)
}
