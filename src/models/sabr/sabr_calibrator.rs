// src/models/sabr/sabr_calibrator.rs

//! SABR calibrator: least squares in vol space over the smile points.
//!
//! The optimisation vector uses `σ0 = α F^{β-1}` instead of `α`, which keeps
//! the level parameter on the scale of a lognormal vol whatever β is.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::config::OptimizationConfig;
use crate::calibration::pipeline::calibrate_model_adaptive;
use crate::calibration::types::ModelCalibrator;
use crate::data::SmileInput;
use crate::error::{RndError, Result};
use crate::models::sabr::sabr_model::{hagan_lognormal_vol, SabrParams, SabrSmile};

const PENALTY: f64 = 1e6;

/// Whether β is fitted or pinned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SabrBeta {
    #[default]
    Free,
    Fixed(f64),
}

/// Parameter bounds for the SABR calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrParamBounds {
    pub sigma0: (f64, f64),
    pub beta: (f64, f64),
    pub rho: (f64, f64),
    pub nu: (f64, f64),
}

impl Default for SabrParamBounds {
    fn default() -> Self {
        Self {
            sigma0: (1e-4, 5.0),
            beta: (0.0, 1.0),
            rho: (-0.999, 0.999),
            nu: (1e-4, 10.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SabrCalibrator {
    forward: f64,
    tau: f64,
    strikes: Vec<f64>,
    vols: Vec<f64>,
    beta: SabrBeta,
    param_bounds: Vec<(f64, f64)>,
}

impl SabrCalibrator {
    pub fn new(input: &SmileInput, tau: f64, beta: SabrBeta) -> Result<Self> {
        Self::with_bounds(input, tau, beta, SabrParamBounds::default())
    }

    pub fn with_bounds(
        input: &SmileInput,
        tau: f64,
        beta: SabrBeta,
        bounds: SabrParamBounds,
    ) -> Result<Self> {
        if input.points.len() < 3 {
            return Err(RndError::InsufficientData {
                timestamp: input.timestamp.to_rfc3339(),
                found: input.points.len(),
                required: 3,
            });
        }
        if let SabrBeta::Fixed(b) = beta {
            if !(0.0..=1.0).contains(&b) {
                return Err(RndError::invalid(format!("fixed SABR beta {b} outside [0, 1]")));
            }
        }
        let param_bounds = match beta {
            SabrBeta::Free => vec![bounds.sigma0, bounds.beta, bounds.rho, bounds.nu],
            SabrBeta::Fixed(_) => vec![bounds.sigma0, bounds.rho, bounds.nu],
        };
        Ok(Self {
            forward: input.forward,
            tau,
            strikes: input.strikes(),
            vols: input.vols(),
            beta,
            param_bounds,
        })
    }

    /// Maps an optimisation vector to raw SABR parameters.
    pub fn params_from_vector(&self, x: &[f64]) -> SabrParams {
        let (sigma0, beta, rho, nu) = match self.beta {
            SabrBeta::Free => (x[0], x[1], x[2], x[3]),
            SabrBeta::Fixed(b) => (x[0], b, x[1], x[2]),
        };
        SabrParams {
            alpha: sigma0 * self.forward.powf(1.0 - beta),
            beta,
            rho,
            nu,
        }
    }

    /// Root mean squared vol error of `params` over the smile points.
    pub fn rmse(&self, params: &SabrParams) -> f64 {
        let sse: f64 = self
            .strikes
            .iter()
            .zip(&self.vols)
            .map(|(&k, &v)| (hagan_lognormal_vol(params, self.forward, k, self.tau) - v).powi(2))
            .sum();
        (sse / self.strikes.len() as f64).sqrt()
    }

    fn atm_vol(&self) -> f64 {
        let mid = self
            .strikes
            .iter()
            .enumerate()
            .min_by(|a, b| {
                (a.1 - self.forward)
                    .abs()
                    .total_cmp(&(b.1 - self.forward).abs())
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.vols[mid]
    }
}

impl ModelCalibrator for SabrCalibrator {
    fn model_name(&self) -> &'static str {
        "sabr"
    }

    fn param_count(&self) -> usize {
        self.param_bounds.len()
    }

    fn param_bounds(&self) -> &[(f64, f64)] {
        &self.param_bounds
    }

    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        let params = self.params_from_vector(x);
        if params.validate().is_err() {
            return PENALTY;
        }
        // vol points, so the objective is not vanishingly small near the optimum
        let mut sse = 0.0;
        for (&k, &v) in self.strikes.iter().zip(&self.vols) {
            let model = hagan_lognormal_vol(&params, self.forward, k, self.tau);
            if !model.is_finite() || model <= 0.0 {
                return PENALTY;
            }
            sse += (100.0 * (model - v)).powi(2);
        }
        sse / self.strikes.len() as f64
    }

    fn param_names(&self) -> Vec<&'static str> {
        match self.beta {
            SabrBeta::Free => vec!["sigma0", "beta", "rho", "nu"],
            SabrBeta::Fixed(_) => vec!["sigma0", "rho", "nu"],
        }
    }

    fn initial_guess(&self) -> Option<Vec<f64>> {
        let (lo, hi) = (self.strikes[0], self.strikes[self.strikes.len() - 1]);
        let skew = self.vols[self.vols.len() - 1] - self.vols[0];
        let rho = if hi > lo { (skew * 2.0).clamp(-0.5, 0.5) } else { 0.0 };
        let sigma0 = self.atm_vol();
        Some(match self.beta {
            SabrBeta::Free => vec![sigma0, 0.5, rho, 1.0],
            SabrBeta::Fixed(_) => vec![sigma0, rho, 1.0],
        })
    }

    /// Only the open-ended upper bounds of σ0 and ν move; β and ρ bounds are
    /// the admissible region itself.
    fn expand_bounds_if_needed(
        &mut self,
        params: &[f64],
        proximity_threshold: f64,
        expansion_factor: f64,
    ) -> bool {
        let names = self.param_names();
        let mut adjusted = false;
        for ((name, bounds), param) in names.iter().zip(self.param_bounds.iter_mut()).zip(params) {
            if *name != "sigma0" && *name != "nu" {
                continue;
            }
            let range = bounds.1 - bounds.0;
            if *param >= bounds.1 - range * proximity_threshold {
                bounds.1 += range * expansion_factor;
                adjusted = true;
            }
        }
        adjusted
    }
}

/// A SABR smile together with its fit quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrFit {
    pub smile: SabrSmile,
    pub rmse: f64,
    pub objective: f64,
}

/// Fits SABR to the smile points of `input`.
///
/// Fails when the optimiser leaves the admissible region, returns invalid
/// parameters, or the vol RMSE exceeds `max_rmse`.
pub fn fit_sabr(
    input: &SmileInput,
    tau: f64,
    beta: SabrBeta,
    config: &OptimizationConfig,
    max_rmse: f64,
) -> Result<SabrFit> {
    let mut calibrator = SabrCalibrator::new(input, tau, beta)?;
    let guess = calibrator.initial_guess();
    let outcome = calibrate_model_adaptive(&mut calibrator, config, guess);

    if !outcome.is_admissible() || outcome.objective >= PENALTY {
        return Err(RndError::fit(
            "sabr",
            format!("optimiser returned inadmissible parameters {:?}", outcome.params),
            Some(outcome.objective),
        ));
    }
    let params = calibrator.params_from_vector(&outcome.params);
    let smile = SabrSmile::new(params, input.forward, tau)
        .map_err(|e| RndError::fit("sabr", e.to_string(), Some(outcome.objective)))?;
    let rmse = calibrator.rmse(&params);
    debug!(
        timestamp = %input.timestamp,
        alpha = params.alpha,
        beta = params.beta,
        rho = params.rho,
        nu = params.nu,
        rmse,
        "fitted SABR"
    );
    if !rmse.is_finite() || rmse > max_rmse {
        return Err(RndError::fit(
            "sabr",
            format!("vol RMSE {rmse:.6} above tolerance {max_rmse}"),
            Some(outcome.objective),
        ));
    }
    Ok(SabrFit {
        smile,
        rmse,
        objective: outcome.objective,
    })
}
