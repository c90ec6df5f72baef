//! Model-free implied variance by static replication with OTM options.
//!
//! With `Q(K)` the OTM price (put below the forward, call above) and `r` the
//! pricing-currency rate:
//!
//! - MFIV: `2 e^{rT} / T ∫ Q(K) / K² dK`
//! - SVIX: `2 e^{rT} / (T F²) ∫ Q(K) dK`

use tracing::debug;

use super::config::VarianceConfig;
use super::quadrature::{simpson, UniformGrid};
use crate::error::{RndError, Result};
use crate::models::bs::otm_price;
use crate::models::smile::FittedSmile;

/// Annualised model-free variance implied by `smile`.
pub fn model_free_variance(
    smile: &FittedSmile,
    rate: f64,
    tau: f64,
    config: &VarianceConfig,
) -> Result<f64> {
    let forward = smile.forward;
    let grid = UniformGrid::new(
        config.lower_bound,
        config.upper_bound(forward),
        config.grid_step,
    )?;

    let mut integrand = Vec::with_capacity(grid.node_count());
    for k in grid.nodes() {
        let q = otm_price(forward, k, rate, tau, smile.vol(k)?);
        integrand.push(if config.svix { q } else { q / (k * k) });
    }
    let integral = simpson(&integrand, grid.step);
    let scale = if config.svix {
        2.0 * (rate * tau).exp() / (tau * forward * forward)
    } else {
        2.0 * (rate * tau).exp() / tau
    };
    let variance = scale * integral;
    debug!(
        forward,
        lower = grid.lower,
        upper = grid.upper(),
        svix = config.svix,
        variance,
        "model-free variance"
    );
    if !(variance.is_finite() && variance >= 0.0) {
        return Err(RndError::integration(format!(
            "model-free variance is {variance}"
        )));
    }
    Ok(variance)
}
