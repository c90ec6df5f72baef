// src/models/sabr/sabr_model.rs

//! SABR smile via Hagan's lognormal implied-vol expansion.
//!
//! For forward `F`, strike `K`, expiry `T` and parameters `(α, β, ρ, ν)`:
//!
//! ```text
//! σ_B(K) = α / [(FK)^{(1-β)/2} (1 + (1-β)²/24 ln²(F/K) + (1-β)⁴/1920 ln⁴(F/K))]
//!          · z / x(z)
//!          · [1 + ((1-β)²/24 α²/(FK)^{1-β} + ρβνα/(4 (FK)^{(1-β)/2}) + (2-3ρ²)ν²/24) T]
//! z    = ν/α (FK)^{(1-β)/2} ln(F/K)
//! x(z) = ln[(√(1 - 2ρz + z²) + z - ρ) / (1 - ρ)]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RndError, Result};
use crate::models::traits::SmileModel;

/// Raw SABR parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrParams {
    /// Initial vol level (α > 0)
    pub alpha: f64,
    /// CEV exponent (0 ≤ β ≤ 1)
    pub beta: f64,
    /// Spot/vol correlation (-1 < ρ < 1)
    pub rho: f64,
    /// Vol of vol (ν ≥ 0)
    pub nu: f64,
}

fn validate_sabr_params(alpha: f64, beta: f64, rho: f64, nu: f64) -> Result<()> {
    let fail = |what: String| Err(RndError::fit("sabr", what, None));
    if !(alpha.is_finite() && alpha > 0.0) {
        return fail(format!("alpha must be positive, got {alpha}"));
    }
    if !(0.0..=1.0).contains(&beta) {
        return fail(format!("beta must lie in [0, 1], got {beta}"));
    }
    if !(rho > -1.0 && rho < 1.0) {
        return fail(format!("rho must lie in (-1, 1), got {rho}"));
    }
    if !(nu.is_finite() && nu >= 0.0) {
        return fail(format!("vol-of-vol must be non-negative, got {nu}"));
    }
    Ok(())
}

impl SabrParams {
    pub fn new(alpha: f64, beta: f64, rho: f64, nu: f64) -> Result<Self> {
        validate_sabr_params(alpha, beta, rho, nu)?;
        Ok(Self {
            alpha,
            beta,
            rho,
            nu,
        })
    }

    pub fn validate(&self) -> Result<()> {
        validate_sabr_params(self.alpha, self.beta, self.rho, self.nu)
    }
}

/// Hagan's lognormal vol. Returns NaN when the expansion breaks down.
pub fn hagan_lognormal_vol(params: &SabrParams, forward: f64, strike: f64, tau: f64) -> f64 {
    let SabrParams {
        alpha,
        beta,
        rho,
        nu,
    } = *params;
    let omb = 1.0 - beta;
    let log_fk = (forward / strike).ln();
    let fk_pow = (forward * strike).powf(0.5 * omb);

    let denom = fk_pow
        * (1.0 + omb * omb / 24.0 * log_fk * log_fk + omb.powi(4) / 1920.0 * log_fk.powi(4));

    let z = nu / alpha * fk_pow * log_fk;
    let z_over_x = if z.abs() < 1e-7 {
        // series of z / x(z) around zero
        1.0 - 0.5 * rho * z + (2.0 - 3.0 * rho * rho) / 12.0 * z * z
    } else {
        let x = ((1.0 - 2.0 * rho * z + z * z).sqrt() + z - rho) / (1.0 - rho);
        z / x.ln()
    };

    let correction = 1.0
        + (omb * omb / 24.0 * alpha * alpha / (fk_pow * fk_pow)
            + 0.25 * rho * beta * nu * alpha / fk_pow
            + (2.0 - 3.0 * rho * rho) / 24.0 * nu * nu)
            * tau;

    alpha / denom * z_over_x * correction
}

/// A fitted SABR smile for one forward and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrSmile {
    pub params: SabrParams,
    pub forward: f64,
    pub tau: f64,
}

impl SabrSmile {
    pub fn new(params: SabrParams, forward: f64, tau: f64) -> Result<Self> {
        params.validate()?;
        if !(forward > 0.0 && tau > 0.0) {
            return Err(RndError::invalid(format!(
                "SABR smile needs positive forward and expiry, got F={forward}, T={tau}"
            )));
        }
        Ok(Self {
            params,
            forward,
            tau,
        })
    }
}

impl SmileModel for SabrSmile {
    fn implied_vol(&self, strike: f64) -> f64 {
        if strike <= 0.0 {
            return f64::NAN;
        }
        hagan_lognormal_vol(&self.params, self.forward, strike, self.tau)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_inadmissible_parameters() {
        assert!(SabrParams::new(0.2, 0.5, 0.0, -0.1).is_err());
        assert!(SabrParams::new(0.2, 1.2, 0.0, 0.1).is_err());
        assert!(SabrParams::new(0.0, 0.5, 0.0, 0.1).is_err());
        assert!(SabrParams::new(0.2, 0.5, 1.0, 0.1).is_err());
        assert!(SabrParams::new(0.2, 0.5, -0.5, 0.0).is_ok());
    }

    #[test]
    fn lognormal_sabr_without_volvol_is_flat() {
        let p = SabrParams::new(0.3, 1.0, 0.0, 0.0).unwrap();
        for k in [70.0, 100.0, 140.0] {
            assert_relative_eq!(hagan_lognormal_vol(&p, 100.0, k, 0.5), 0.3, epsilon = 1e-14);
        }
    }

    #[test]
    fn atm_limit_is_continuous() {
        let p = SabrParams::new(2.0, 0.5, -0.3, 0.8).unwrap();
        let atm = hagan_lognormal_vol(&p, 100.0, 100.0, 0.25);
        let near = hagan_lognormal_vol(&p, 100.0, 100.0 * (1.0 + 1e-6), 0.25);
        assert_relative_eq!(atm, near, epsilon = 1e-6);
    }

    #[test]
    fn negative_rho_gives_downward_skew() {
        let smile = SabrSmile::new(SabrParams::new(2.0, 0.5, -0.5, 0.6).unwrap(), 100.0, 0.25)
            .unwrap();
        assert!(smile.implied_vol(85.0) > smile.implied_vol(115.0));
    }
}
