//! Two-component log-normal mixture for the terminal exchange rate.
//!
//! `S_T ~ w LN(μ1, σ1²) + (1 - w) LN(μ2, σ2²)`; call prices and the CDF are
//! mixtures of the component closed forms.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, LogNormal};
use tracing::debug;

use crate::calibration::config::OptimizationConfig;
use crate::calibration::pipeline::calibrate_model_adaptive;
use crate::calibration::types::ModelCalibrator;
use crate::data::SmileInput;
use crate::error::{RndError, Result};
use crate::models::bs::{black_call_price, norm_cdf};

const PENALTY: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogNormalMixture {
    pub weight: f64,
    pub mu1: f64,
    pub mu2: f64,
    pub sigma1: f64,
    pub sigma2: f64,
}

impl LogNormalMixture {
    /// Parameter vector order: `[w, μ1, μ2, σ1, σ2]`.
    pub fn from_vector(x: &[f64]) -> Self {
        Self {
            weight: x[0],
            mu1: x[1],
            mu2: x[2],
            sigma1: x[3],
            sigma2: x[4],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(RndError::fit(
                "lognormal_mixture",
                format!("weight {} outside [0, 1]", self.weight),
                None,
            ));
        }
        if !(self.sigma1 > 0.0 && self.sigma2 > 0.0) {
            return Err(RndError::fit(
                "lognormal_mixture",
                format!("non-positive scale ({}, {})", self.sigma1, self.sigma2),
                None,
            ));
        }
        if !(self.mu1.is_finite() && self.mu2.is_finite()) {
            return Err(RndError::fit("lognormal_mixture", "non-finite location", None));
        }
        Ok(())
    }

    pub fn mean(&self) -> f64 {
        let m = |mu: f64, s: f64| (mu + 0.5 * s * s).exp();
        self.weight * m(self.mu1, self.sigma1) + (1.0 - self.weight) * m(self.mu2, self.sigma2)
    }

    /// Discounted call price at `strike`.
    pub fn call_price(&self, strike: f64, rate: f64, tau: f64) -> f64 {
        let undiscounted = |mu: f64, s: f64| {
            let d1 = (mu + s * s - strike.ln()) / s;
            (mu + 0.5 * s * s).exp() * norm_cdf(d1) - strike * norm_cdf(d1 - s)
        };
        (-rate * tau).exp()
            * (self.weight * undiscounted(self.mu1, self.sigma1)
                + (1.0 - self.weight) * undiscounted(self.mu2, self.sigma2))
    }

    pub fn cdf(&self, x: f64) -> Result<f64> {
        let component = |mu: f64, s: f64| -> Result<f64> {
            let d = LogNormal::new(mu, s).map_err(|e| {
                RndError::fit("lognormal_mixture", format!("invalid component: {e}"), None)
            })?;
            Ok(d.cdf(x))
        };
        Ok(self.weight * component(self.mu1, self.sigma1)?
            + (1.0 - self.weight) * component(self.mu2, self.sigma2)?)
    }

    /// `P[S_T > threshold]` in closed form.
    pub fn tail_probability(&self, threshold: f64) -> Result<f64> {
        Ok(1.0 - self.cdf(threshold)?)
    }
}

/// Settings of the mixture fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureConfig {
    /// Starting mixing weight.
    pub initial_weight: f64,
    /// Weight of the forward-matching residual.
    pub forward_weight: f64,
    /// Weights of the price residuals in strike order; missing entries count 1.
    pub price_weights: Vec<f64>,
    /// Largest accepted objective.
    pub max_objective: f64,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            initial_weight: 0.34,
            forward_weight: 2.0,
            // the ATM strike sits in the middle of the five pillars
            price_weights: vec![1.0, 1.0, 2.0, 1.0, 1.0],
            max_objective: 0.25,
        }
    }
}

/// Weighted least squares of the mixture against call prices and the
/// forward. Residuals are in percent of the forward.
#[derive(Debug, Clone)]
pub struct MixtureCalibrator {
    forward: f64,
    rate: f64,
    tau: f64,
    strikes: Vec<f64>,
    prices: Vec<f64>,
    weights: Vec<f64>,
    forward_weight: f64,
    initial: Vec<f64>,
    param_bounds: Vec<(f64, f64)>,
}

impl MixtureCalibrator {
    /// Prices the smile points as Black calls and sets up the fit.
    pub fn new(input: &SmileInput, tau: f64, config: &MixtureConfig) -> Result<Self> {
        if input.points.is_empty() {
            return Err(RndError::invalid("mixture fit needs at least one price"));
        }
        let forward = input.forward;
        let rate = input.r_counter;
        let strikes = input.strikes();
        let vols = input.vols();
        let prices: Vec<f64> = strikes
            .iter()
            .zip(&vols)
            .map(|(&k, &v)| black_call_price(forward, k, rate, tau, v))
            .collect();
        let weights = (0..strikes.len())
            .map(|i| config.price_weights.get(i).copied().unwrap_or(1.0))
            .collect();

        let mean_vol = vols.iter().sum::<f64>() / vols.len() as f64;
        let s = mean_vol * tau.sqrt();
        let mu = forward.ln() - 0.5 * s * s;
        let initial = vec![config.initial_weight, mu, mu, s, s];
        let ln_f = forward.ln();
        let param_bounds = vec![
            (0.0, 1.0),
            (ln_f - 1.0, ln_f + 1.0),
            (ln_f - 1.0, ln_f + 1.0),
            (1e-3, 2.0),
            (1e-3, 2.0),
        ];
        Ok(Self {
            forward,
            rate,
            tau,
            strikes,
            prices,
            weights,
            forward_weight: config.forward_weight,
            initial,
            param_bounds,
        })
    }
}

impl ModelCalibrator for MixtureCalibrator {
    fn model_name(&self) -> &'static str {
        "lognormal_mixture"
    }

    fn param_count(&self) -> usize {
        5
    }

    fn param_bounds(&self) -> &[(f64, f64)] {
        &self.param_bounds
    }

    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        let mix = LogNormalMixture::from_vector(x);
        if mix.validate().is_err() {
            return PENALTY;
        }
        let scale = 100.0 / self.forward;
        let fwd_res = (mix.mean() - self.forward) * scale;
        let mut obj = self.forward_weight * fwd_res * fwd_res;
        for ((&k, &c), &w) in self.strikes.iter().zip(&self.prices).zip(&self.weights) {
            let res = (mix.call_price(k, self.rate, self.tau) - c) * scale;
            obj += w * res * res;
        }
        if obj.is_finite() {
            obj
        } else {
            PENALTY
        }
    }

    fn param_names(&self) -> Vec<&'static str> {
        vec!["w", "mu1", "mu2", "sigma1", "sigma2"]
    }

    fn initial_guess(&self) -> Option<Vec<f64>> {
        Some(self.initial.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixtureFit {
    pub mixture: LogNormalMixture,
    pub objective: f64,
}

/// Fits the mixture to the call prices implied by `input`.
pub fn fit_mixture(
    input: &SmileInput,
    tau: f64,
    config: &MixtureConfig,
    optimizer: &OptimizationConfig,
) -> Result<MixtureFit> {
    let mut calibrator = MixtureCalibrator::new(input, tau, config)?;
    let guess = calibrator.initial_guess();
    let outcome = calibrate_model_adaptive(&mut calibrator, optimizer, guess);
    if !outcome.is_admissible() {
        return Err(RndError::fit(
            "lognormal_mixture",
            format!("optimiser returned inadmissible parameters {:?}", outcome.params),
            Some(outcome.objective),
        ));
    }
    let mixture = LogNormalMixture::from_vector(&outcome.params);
    mixture.validate()?;
    debug!(
        timestamp = %input.timestamp,
        weight = mixture.weight,
        objective = outcome.objective,
        "fitted log-normal mixture"
    );
    if outcome.objective > config.max_objective {
        return Err(RndError::fit(
            "lognormal_mixture",
            format!(
                "objective {:.6} above tolerance {}",
                outcome.objective, config.max_objective
            ),
            Some(outcome.objective),
        ));
    }
    Ok(MixtureFit {
        mixture,
        objective: outcome.objective,
    })
}
