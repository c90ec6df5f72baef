//! Error taxonomy for smile construction, density estimation and batch runs.
//!
//! Per-timestamp failures (`Conversion`, `Fit`, `Integration`) are caught at the
//! batch boundary and recorded next to the timestamp they belong to. `Schema`
//! and `Config` errors are systemic and abort a batch before any work is
//! fanned out.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, RndError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RndError {
    /// Fewer volatility quotes than needed to pin down a smile.
    #[error("insufficient data at {timestamp}: {found} volatility quotes, need {required}")]
    InsufficientData {
        timestamp: String,
        found: usize,
        required: usize,
    },

    /// Delta-to-strike inversion failed or produced an implausible strike.
    #[error("delta-to-strike conversion failed: {message}")]
    Conversion { message: String },

    /// SABR or mixture optimiser did not converge or left admissible bounds.
    #[error("{model} fit failed: {message}")]
    Fit {
        model: &'static str,
        message: String,
        /// Final objective value, if the optimiser returned one.
        objective: Option<f64>,
    },

    /// Quadrature over the density failed or produced an invalid probability.
    #[error("integration failed: {message}")]
    Integration { message: String },

    /// Input table is malformed (e.g. an instrument is missing altogether).
    #[error("schema error: {message}")]
    Schema { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("plot error: {message}")]
    Plot { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Serialisable category of a recorded per-timestamp failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    InsufficientData,
    Conversion,
    Fit,
    Integration,
    InvalidInput,
    /// A task panicked inside the numerical core.
    Panic,
    Other,
}

impl RndError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    pub fn integration(message: impl Into<String>) -> Self {
        Self::Integration {
            message: message.into(),
        }
    }

    pub fn fit(model: &'static str, message: impl Into<String>, objective: Option<f64>) -> Self {
        Self::Fit {
            model,
            message: message.into(),
            objective,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InsufficientData { .. } => FailureKind::InsufficientData,
            Self::Conversion { .. } => FailureKind::Conversion,
            Self::Fit { .. } => FailureKind::Fit,
            Self::Integration { .. } => FailureKind::Integration,
            Self::InvalidInput { .. } => FailureKind::InvalidInput,
            _ => FailureKind::Other,
        }
    }

    /// Whether the error dooms every timestamp of a batch, not just one.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::Config { .. } | Self::Io(_) | Self::Csv(_)
        )
    }
}

/// Checks that `value` is finite and strictly positive.
pub(crate) fn validate_positive(value: f64, name: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RndError::invalid(format!(
            "{name} must be finite and > 0, got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_finite(value: f64, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(RndError::invalid(format!("{name} must be finite, got {value}")));
    }
    Ok(())
}
