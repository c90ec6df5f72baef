pub mod sabr_calibrator;
pub mod sabr_model;

pub use sabr_calibrator::{fit_sabr, SabrBeta, SabrCalibrator, SabrFit, SabrParamBounds};
pub use sabr_model::{hagan_lognormal_vol, SabrParams, SabrSmile};
