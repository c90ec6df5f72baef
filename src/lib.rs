//! # rnd-lib: Risk-Neutral Densities from FX Option Smiles
//!
//! `rnd-lib` turns intraday USDRUB option quotes (ATM vol, 10/25-delta risk
//! reversals and butterflies, spot, forward and both interest rates) into
//! per-timestamp estimates of the risk-neutral distribution of the one-month
//! exchange rate:
//!
//! - **Smile construction**: RR/BF vanilla decomposition, premium-adjusted
//!   delta-to-strike conversion, SABR or cubic-spline smiles
//! - **Model-free probability**: `P[S_T > K]` from the Breeden-Litzenberger
//!   density of the fitted smile
//! - **Model-free variance**: SVIX or MFIV from a static option portfolio
//! - **Parametric probability**: two-component log-normal mixture fitted to
//!   OTM prices and the forward
//! - **Batch runs**: sequential or parallel, failures recorded per timestamp,
//!   results memoised on disk
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rnd_lib::{estimate_probability, BatchInput, BatchOptions, EstimationConfig,
//!     EstimatorKind, QuoteTable};
//!
//! let quotes = QuoteTable::from_csv_path("quotes.csv")?;
//! let config = EstimationConfig::default();
//! let input = BatchInput::from_quotes(&quotes, &config)?;
//!
//! let options = BatchOptions::parallel().with_cache("cache");
//! let p85 = estimate_probability(&input, EstimatorKind::ModelFreeProbability, &config, &options)?;
//! for (ts, p) in p85.values() {
//!     println!("{ts} {p:.4}");
//! }
//! # Ok::<(), rnd_lib::RndError>(())
//! ```
//!
//! ## Configuration Presets
//!
//! Optimiser presets for the SABR and mixture fits live in [`default_configs`]:
//! - `production()`: full CMA-ES budget with L-BFGS-B polish
//! - `fast()`: development and batch runs over many timestamps
//! - `research()`: largest budget, for one-off studies
//! - `minimal()`: smoke tests

// ================================================================================================
// MODULES
// ================================================================================================

pub mod batch;
pub mod calibration;
pub mod data;
pub mod error;
pub mod estimation;
pub mod logging;
pub mod models;
pub mod visuals;

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

pub use error::{FailureKind, Result, RndError};

// Market data
pub use data::{
    build_snapshots, normalize_raw_quotes, parse_timestamp, Instrument, MarketSnapshot,
    QuoteTable, SmileInput, StrikeVol, Timestamp,
};

// Optimiser configuration
pub use calibration::{AdaptiveBoundsConfig, CmaEsConfig, OptimizationConfig};

// Smile models
pub use models::{
    Extrapolation, FittedSmile, FxConventions, LogNormalMixture, MixtureConfig, SabrBeta,
    SabrParams, SmileBuilder, SmileConfig, SmileSource,
};
pub use models::fx::AtmConvention;

// Estimators
pub use estimation::{DensityConfig, EstimationConfig, Estimator, EstimatorKind, VarianceConfig};

// Batch orchestration
pub use batch::{
    estimate_mfiv, estimate_probability, estimate_probability_multiple_levels, BatchInput,
    BatchOptions, EstimateSeries, EstimateTable, EstimationFailure,
};

pub use logging::init_logging;

// ================================================================================================
// DEFAULT CONFIGURATIONS
// ================================================================================================

/// Pre-configured optimiser settings for the smile and mixture fits.
///
/// # Available Configurations
///
/// - [`production()`]: largest routine budget, adaptive bounds on
/// - [`fast()`]: development and long batches
/// - [`research()`]: highest precision
/// - [`minimal()`]: quick validation and tests
pub mod default_configs {
    use crate::calibration::config::OptimizationConfig;
    use crate::estimation::EstimationConfig;

    /// Full CMA-ES budget followed by L-BFGS-B refinement.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rnd_lib::default_configs;
    ///
    /// let config = default_configs::production();
    /// assert!(config.cmaes.lbfgsb_enabled);
    /// ```
    pub fn production() -> OptimizationConfig {
        OptimizationConfig::production()
    }

    /// Smaller budget, still robust on the five-point smiles of this market.
    pub fn fast() -> OptimizationConfig {
        OptimizationConfig::fast()
    }

    /// Largest budget, for sensitivity studies on a handful of timestamps.
    pub fn research() -> OptimizationConfig {
        OptimizationConfig::research()
    }

    /// Very small budget for smoke tests.
    pub fn minimal() -> OptimizationConfig {
        OptimizationConfig::minimal()
    }

    /// Estimation defaults with the given optimiser preset.
    ///
    /// ```rust
    /// use rnd_lib::default_configs;
    ///
    /// let config = default_configs::estimation(default_configs::fast());
    /// assert_eq!(config.threshold, 85.0);
    /// ```
    pub fn estimation(optimizer: OptimizationConfig) -> EstimationConfig {
        EstimationConfig {
            optimizer,
            ..EstimationConfig::default()
        }
    }
}

// ================================================================================================
// CONVENIENCE FUNCTIONS
// ================================================================================================

/// Builds the five-point smile of one snapshot and fits the configured curve.
///
/// Returns the fitted smile together with the strike/vol input it was fitted
/// to, which plots and diagnostics need alongside it.
///
/// # Errors
///
/// A `Conversion` error if a pillar strike cannot be solved, a `Fit` error if
/// SABR does not reach the configured RMSE.
pub fn fit_smile(
    snapshot: &MarketSnapshot,
    config: &EstimationConfig,
) -> Result<(FittedSmile, SmileInput)> {
    let builder = SmileBuilder::new(config.conventions, config.maturity);
    let input = builder.smile_input(snapshot)?;
    let smile = FittedSmile::fit(&input, config.maturity, &config.smile, &config.optimizer)?;
    Ok((smile, input))
}

/// `P[S_T > threshold]` for a single snapshot, outside any batch.
pub fn probability_for_snapshot(
    snapshot: &MarketSnapshot,
    kind: EstimatorKind,
    threshold: f64,
    config: &EstimationConfig,
) -> Result<f64> {
    config.check_thresholds(&[threshold])?;
    let builder = SmileBuilder::new(config.conventions, config.maturity);
    let input = builder.smile_input(snapshot)?;
    Estimator::new(kind, config.clone())?.probability(&input, threshold)
}
