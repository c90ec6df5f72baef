//! Density and statistic estimators.
//!
//! The estimation mode is a tagged [`EstimatorKind`] resolved into an
//! [`Estimator`] once per batch, so an unknown mode is a configuration error
//! and never reaches the per-timestamp tasks.

pub mod config;
pub mod density;
pub mod quadrature;
pub mod variance;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use config::{DensityConfig, EstimationConfig, VarianceConfig};
pub use density::DensityCurve;
pub use quadrature::{simpson, UniformGrid};
pub use variance::model_free_variance;

use crate::data::SmileInput;
use crate::error::{RndError, Result};
use crate::models::mixture::fit_mixture;
use crate::models::smile::{Extrapolation, FittedSmile, SmileConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Tail probability from the density implied by the fitted smile.
    ModelFreeProbability,
    /// Model-free implied variance (SVIX or MFIV).
    ModelFreeVariance,
    /// Tail probability of a two-component log-normal mixture fitted to prices.
    ParametricMixture,
}

impl EstimatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelFreeProbability => "model-free",
            Self::ModelFreeVariance => "model-free-variance",
            Self::ParametricMixture => "parametric",
        }
    }

    pub fn is_probability(&self) -> bool {
        !matches!(self, Self::ModelFreeVariance)
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimatorKind {
    type Err = RndError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "model-free" | "model-free-probability" | "mf" => Ok(Self::ModelFreeProbability),
            "model-free-variance" | "mfiv" | "svix" | "variance" => Ok(Self::ModelFreeVariance),
            "parametric" | "mixture" | "lognormal-mixture" => Ok(Self::ParametricMixture),
            other => Err(RndError::Config {
                message: format!(
                    "unknown estimation kind '{other}', expected 'parametric', 'model-free' or 'model-free-variance'"
                ),
            }),
        }
    }
}

/// A validated estimation strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimator {
    kind: EstimatorKind,
    config: EstimationConfig,
}

impl Estimator {
    pub fn new(kind: EstimatorKind, config: EstimationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { kind, config })
    }

    pub fn kind(&self) -> EstimatorKind {
        self.kind
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    /// Tail probabilities `P[S_T > t]` for every threshold.
    ///
    /// The smile or mixture is fitted once; a fit failure fails the whole
    /// row, while an integration failure only fails its own threshold.
    pub fn probabilities(
        &self,
        input: &SmileInput,
        thresholds: &[f64],
    ) -> Result<Vec<Result<f64>>> {
        let tau = self.config.maturity;
        match self.kind {
            EstimatorKind::ModelFreeProbability => {
                let lowest = thresholds.iter().copied().fold(f64::INFINITY, f64::min);
                if !lowest.is_finite() {
                    return Err(RndError::invalid("no thresholds requested"));
                }
                let smile =
                    FittedSmile::fit(input, tau, &self.config.smile, &self.config.optimizer)?;
                let curve = DensityCurve::from_smile(
                    &smile,
                    input.r_counter,
                    tau,
                    lowest,
                    &self.config.density,
                )?;
                debug!(
                    timestamp = %input.timestamp,
                    model = smile.model_name(),
                    mass = curve.mass(),
                    "density ready"
                );
                Ok(thresholds.iter().map(|&t| curve.tail_probability(t)).collect())
            }
            EstimatorKind::ParametricMixture => {
                let fit = fit_mixture(input, tau, &self.config.mixture, &self.config.optimizer)?;
                let tolerance = self.config.density.probability_tolerance;
                Ok(thresholds
                    .iter()
                    .map(|&t| {
                        fit.mixture
                            .tail_probability(t)
                            .and_then(|p| density::clamp_probability(p, tolerance))
                    })
                    .collect())
            }
            EstimatorKind::ModelFreeVariance => Err(RndError::Config {
                message: "model-free variance does not produce tail probabilities".to_string(),
            }),
        }
    }

    /// Single-threshold convenience over [`probabilities`](Self::probabilities).
    pub fn probability(&self, input: &SmileInput, threshold: f64) -> Result<f64> {
        self.probabilities(input, &[threshold])?
            .pop()
            .unwrap_or_else(|| Err(RndError::integration("no probability computed")))
    }

    /// Model-free implied variance of the smile in `input`.
    pub fn variance(&self, input: &SmileInput) -> Result<f64> {
        let smile_config = SmileConfig {
            source: self.config.variance.source,
            extrapolation: Extrapolation::Natural,
            ..self.config.smile
        };
        let smile = FittedSmile::fit(
            input,
            self.config.maturity,
            &smile_config,
            &self.config.optimizer,
        )?;
        model_free_variance(
            &smile,
            input.r_counter,
            self.config.maturity,
            &self.config.variance,
        )
    }
}
