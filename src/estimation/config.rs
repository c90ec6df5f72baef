use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::config::OptimizationConfig;
use crate::error::{RndError, Result};
use crate::models::fx::FxConventions;
use crate::models::mixture::MixtureConfig;
use crate::models::smile::{SmileConfig, SmileSource};

/// Grid of the model-free probability: call prices on
/// `[threshold, upper_bound]` every `grid_step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    pub grid_step: f64,
    pub upper_bound: f64,
    /// Probabilities within this distance of [0, 1] are clamped; further out
    /// they are integration errors.
    pub probability_tolerance: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            grid_step: 1e-4,
            upper_bound: 200.0,
            probability_tolerance: 1e-3,
        }
    }
}

/// Static replication domain of the model-free variance:
/// `[lower_bound, max(upper_floor, upper_multiplier * F)]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceConfig {
    /// Curve the OTM prices are read from; it always extrapolates.
    pub source: SmileSource,
    pub lower_bound: f64,
    pub upper_floor: f64,
    pub upper_multiplier: f64,
    pub grid_step: f64,
    /// Simple variance swap (SVIX) instead of the log-contract MFIV.
    pub svix: bool,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            source: SmileSource::CubicSpline,
            lower_bound: 60.0,
            upper_floor: 100.0,
            upper_multiplier: 1.3,
            grid_step: 1e-4,
            svix: true,
        }
    }
}

impl VarianceConfig {
    pub fn upper_bound(&self, forward: f64) -> f64 {
        self.upper_floor.max(self.upper_multiplier * forward)
    }
}

/// Everything that determines the numbers a batch produces.
///
/// Execution settings (parallelism, worker count, cache location) live in
/// [`crate::batch::BatchOptions`] and never enter a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Option and forward maturity in years.
    pub maturity: f64,
    pub conventions: FxConventions,
    pub smile: SmileConfig,
    pub density: DensityConfig,
    pub variance: VarianceConfig,
    pub mixture: MixtureConfig,
    pub optimizer: OptimizationConfig,
    /// Threshold of the single-level probability entry point.
    pub threshold: f64,
    pub multi_level_thresholds: Vec<f64>,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            maturity: 1.0 / 12.0,
            conventions: FxConventions::default(),
            smile: SmileConfig::default(),
            density: DensityConfig::default(),
            variance: VarianceConfig::default(),
            mixture: MixtureConfig::default(),
            optimizer: OptimizationConfig::default(),
            threshold: 85.0,
            multi_level_thresholds: (0..6).map(|i| 85.0 + 10.0 * i as f64).collect(),
        }
    }
}

impl EstimationConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| RndError::Config {
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Rejects settings no timestamp could succeed with.
    pub fn validate(&self) -> Result<()> {
        let bad = |message: String| Err(RndError::Config { message });
        if !(self.maturity > 0.0 && self.maturity.is_finite()) {
            return bad(format!("maturity must be positive, got {}", self.maturity));
        }
        if !(self.density.grid_step > 0.0 && self.variance.grid_step > 0.0) {
            return bad("grid steps must be positive".to_string());
        }
        if self.density.probability_tolerance < 0.0 {
            return bad("probability tolerance must be non-negative".to_string());
        }
        if self.variance.lower_bound <= 0.0 {
            return bad(format!(
                "variance lower bound must be positive, got {}",
                self.variance.lower_bound
            ));
        }
        if !(0.0..=1.0).contains(&self.mixture.initial_weight) {
            return bad(format!(
                "initial mixture weight {} outside [0, 1]",
                self.mixture.initial_weight
            ));
        }
        if self.smile.min_vol <= 0.0 {
            return bad("minimum vol must be positive".to_string());
        }
        if self.optimizer.pop_size == 0 || self.optimizer.max_gen == 0 {
            return bad("optimizer population and generations must be non-zero".to_string());
        }
        self.check_thresholds(&[self.threshold])?;
        self.check_thresholds(&self.multi_level_thresholds)
    }

    /// Copy with the optimiser's execution-only switches reset. Two configs
    /// that differ only in those produce the same numbers and share a cache
    /// entry.
    pub fn cache_identity(&self) -> Self {
        let mut cfg = self.clone();
        cfg.optimizer.cmaes.parallel_eval = false;
        cfg.optimizer.cmaes.verbosity = 0;
        cfg
    }

    pub(crate) fn check_thresholds(&self, thresholds: &[f64]) -> Result<()> {
        if thresholds.is_empty() {
            return Err(RndError::Config {
                message: "at least one threshold is required".to_string(),
            });
        }
        for &t in thresholds {
            if !(t > 0.0 && t < self.density.upper_bound) {
                return Err(RndError::Config {
                    message: format!(
                        "threshold {t} must lie in (0, {})",
                        self.density.upper_bound
                    ),
                });
            }
        }
        Ok(())
    }
}
