pub mod config;
pub mod pipeline;
pub mod types;

pub use config::{AdaptiveBoundsConfig, CmaEsConfig, OptimizationConfig};
pub use pipeline::{calibrate_model, calibrate_model_adaptive};
pub use types::{CalibrationOutcome, ModelCalibrator};
