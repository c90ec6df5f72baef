pub mod bs;
pub mod fx;
pub mod mixture;
pub mod sabr;
pub mod smile;
pub mod spline;

/// Common traits used by the smile models
pub mod traits {
    /// A vol(strike) curve for a single expiry.
    pub trait SmileModel {
        /// Black implied vol at `strike`; NaN where the model is undefined.
        fn implied_vol(&self, strike: f64) -> f64;

        /// Implied vols at several strikes.
        fn implied_vols(&self, strikes: &[f64]) -> Vec<f64> {
            strikes.iter().map(|&k| self.implied_vol(k)).collect()
        }
    }
}

pub use fx::{FxConventions, SmileBuilder};
pub use mixture::{LogNormalMixture, MixtureConfig};
pub use sabr::{SabrBeta, SabrParams, SabrSmile};
pub use smile::{Extrapolation, FittedSmile, SmileConfig, SmileSource};
pub use spline::CubicSpline;
