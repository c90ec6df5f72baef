//! Continuous smiles built from the five (strike, vol) points.

use serde::{Deserialize, Serialize};

use crate::calibration::config::OptimizationConfig;
use crate::data::SmileInput;
use crate::error::{RndError, Result};
use crate::models::sabr::{fit_sabr, SabrBeta, SabrFit};
use crate::models::spline::CubicSpline;
use crate::models::traits::SmileModel;

/// Which curve goes through the smile points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmileSource {
    #[default]
    Sabr,
    CubicSpline,
}

/// What happens to strikes outside the quoted strike range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Outside strikes are an error.
    #[default]
    Forbid,
    /// Vol held at the nearest end point.
    Flat,
    /// The model's own continuation: the SABR formula, or straight lines
    /// along the end slopes for the spline.
    Natural,
}

/// Curve choice and domain policy of the smile.
///
/// A bare [`Extrapolation`] forbids strikes outside the quotes. The
/// estimation preset returned by `SmileConfig::default()` opts in to
/// [`Extrapolation::Natural`], since the density grid runs from the lowest
/// threshold to 200, well past the 10-delta call strike. Set
/// `extrapolation = "forbid"` to make any such strike a failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmileConfig {
    pub source: SmileSource,
    pub sabr_beta: SabrBeta,
    pub extrapolation: Extrapolation,
    /// Largest accepted SABR vol RMSE, fraction of 1.
    pub max_rmse: f64,
    /// Floor applied to every vol read off the smile.
    pub min_vol: f64,
}

impl Default for SmileConfig {
    fn default() -> Self {
        Self {
            source: SmileSource::Sabr,
            sabr_beta: SabrBeta::Free,
            extrapolation: Extrapolation::Natural,
            max_rmse: 0.01,
            min_vol: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SmileCurve {
    Sabr(SabrFit),
    CubicSpline(CubicSpline),
}

/// A vol(strike) function valid on `domain`, with an explicit policy for
/// strikes outside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSmile {
    pub curve: SmileCurve,
    pub forward: f64,
    pub domain: (f64, f64),
    pub extrapolation: Extrapolation,
    pub min_vol: f64,
}

impl FittedSmile {
    /// Fits the configured curve to `input`.
    pub fn fit(
        input: &SmileInput,
        tau: f64,
        config: &SmileConfig,
        optimizer: &OptimizationConfig,
    ) -> Result<Self> {
        let curve = match config.source {
            SmileSource::Sabr => SmileCurve::Sabr(fit_sabr(
                input,
                tau,
                config.sabr_beta,
                optimizer,
                config.max_rmse,
            )?),
            SmileSource::CubicSpline => {
                SmileCurve::CubicSpline(CubicSpline::new(&input.strikes(), &input.vols())?)
            }
        };
        Self::from_curve(curve, input, config)
    }

    /// Interpolating spline through `input`, whatever the configured source.
    pub fn spline(input: &SmileInput, config: &SmileConfig) -> Result<Self> {
        let curve = SmileCurve::CubicSpline(CubicSpline::new(&input.strikes(), &input.vols())?);
        Self::from_curve(curve, input, config)
    }

    fn from_curve(curve: SmileCurve, input: &SmileInput, config: &SmileConfig) -> Result<Self> {
        let (Some(first), Some(last)) = (input.points.first(), input.points.last()) else {
            return Err(RndError::invalid("smile input has no points"));
        };
        Ok(Self {
            curve,
            forward: input.forward,
            domain: (first.strike, last.strike),
            extrapolation: config.extrapolation,
            min_vol: config.min_vol,
        })
    }

    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    pub fn contains(&self, strike: f64) -> bool {
        strike >= self.domain.0 && strike <= self.domain.1
    }

    /// Vol at `strike` under the smile's extrapolation policy, floored at
    /// `min_vol`.
    pub fn vol(&self, strike: f64) -> Result<f64> {
        let (lo, hi) = self.domain;
        let raw = if self.contains(strike) {
            self.raw_vol(strike)
        } else {
            match self.extrapolation {
                Extrapolation::Forbid => {
                    return Err(RndError::invalid(format!(
                        "strike {strike} outside smile domain [{lo}, {hi}]"
                    )))
                }
                Extrapolation::Flat => self.raw_vol(strike.clamp(lo, hi)),
                Extrapolation::Natural => match &self.curve {
                    SmileCurve::Sabr(fit) => fit.smile.implied_vol(strike),
                    SmileCurve::CubicSpline(s) => s.value_linear_tails(strike),
                },
            }
        };
        if !raw.is_finite() {
            return Err(RndError::invalid(format!(
                "smile returned a non-finite vol at strike {strike}"
            )));
        }
        Ok(raw.max(self.min_vol))
    }

    fn raw_vol(&self, strike: f64) -> f64 {
        match &self.curve {
            SmileCurve::Sabr(fit) => fit.smile.implied_vol(strike),
            SmileCurve::CubicSpline(s) => s.value(strike),
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self.curve {
            SmileCurve::Sabr(_) => "sabr",
            SmileCurve::CubicSpline(_) => "cubic_spline",
        }
    }
}
