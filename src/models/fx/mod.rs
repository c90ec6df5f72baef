//! FX delta conventions and the delta to strike inversion.
//!
//! Deltas follow the FX market conventions: spot or forward delta, with or
//! without premium adjustment. With `r_f` the base-currency rate and
//! `s = sigma * sqrt(T)`:
//!
//! | convention            | call                         | put                            |
//! |-----------------------|------------------------------|--------------------------------|
//! | spot                  | `e^{-r_f T} N(d1)`           | `-e^{-r_f T} N(-d1)`           |
//! | forward               | `N(d1)`                      | `-N(-d1)`                      |
//! | spot, premium-adj.    | `e^{-r_f T} (K/F) N(d2)`     | `-e^{-r_f T} (K/F) N(-d2)`     |
//! | forward, premium-adj. | `(K/F) N(d2)`                | `-(K/F) N(-d2)`                |
//!
//! The premium-adjusted call delta is not monotone in strike, so its
//! inversion is an explicit Brent root-find on the branch right of the delta
//! maximum.

pub mod builder;

pub use builder::{build_strike_vol_frames, DeltaStrike, SmileBuilder, StrikeVolFrames};

use roots::{find_root_brent, SimpleConvergency};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{RndError, Result};
use crate::models::bs::{norm_cdf, norm_pdf};

/// Definition of the at-the-money strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AtmConvention {
    /// Strike at which call and put deltas sum to zero.
    #[default]
    DeltaNeutralStraddle,
    /// Strike equal to the outright forward.
    Forward,
}

/// Delta convention bundle used to turn quoted deltas into strikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConventions {
    pub atm: AtmConvention,
    pub premium_adjusted: bool,
    pub forward_delta: bool,
}

impl Default for FxConventions {
    /// USDRUB market standard: DNS ATM, premium-adjusted spot delta.
    fn default() -> Self {
        Self {
            atm: AtmConvention::DeltaNeutralStraddle,
            premium_adjusted: true,
            forward_delta: false,
        }
    }
}

/// Root-finding contract for the strike inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 200,
        }
    }
}

/// Market data the conversions need, independent of the vol quotes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxMarket {
    pub spot: f64,
    pub forward: f64,
    /// Base-currency rate (the foreign rate in Garman-Kohlhagen terms).
    pub r_base: f64,
    pub tau: f64,
}

impl FxMarket {
    fn delta_discount(&self, conventions: &FxConventions) -> f64 {
        if conventions.forward_delta {
            1.0
        } else {
            (-self.r_base * self.tau).exp()
        }
    }
}

/// Vols of the call and the put at one delta pillar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VanillaPair {
    pub call: f64,
    pub put: f64,
}

/// Recovers the call and put vols from ATM, risk reversal and butterfly:
/// `rr = call - put`, `bf = (call + put) / 2 - atm`.
pub fn decompose_vanillas(atm: f64, risk_reversal: f64, butterfly: f64) -> VanillaPair {
    VanillaPair {
        call: atm + butterfly + 0.5 * risk_reversal,
        put: atm + butterfly - 0.5 * risk_reversal,
    }
}

fn d1_d2(forward: f64, strike: f64, s: f64) -> (f64, f64) {
    let d1 = ((forward / strike).ln() + 0.5 * s * s) / s;
    (d1, d1 - s)
}

/// Delta of a vanilla under `conventions`; negative for puts.
pub fn fx_delta(
    market: &FxMarket,
    strike: f64,
    vol: f64,
    is_call: bool,
    conventions: &FxConventions,
) -> f64 {
    let df = market.delta_discount(conventions);
    let s = vol * market.tau.sqrt();
    let (d1, d2) = d1_d2(market.forward, strike, s);
    let phi = if is_call { 1.0 } else { -1.0 };
    if conventions.premium_adjusted {
        phi * df * (strike / market.forward) * norm_cdf(phi * d2)
    } else {
        phi * df * norm_cdf(phi * d1)
    }
}

/// ATM strike for `conventions`.
///
/// The delta-neutral straddle strike is `F e^{-s^2/2}` with premium
/// adjustment and `F e^{s^2/2}` without.
pub fn atm_strike(market: &FxMarket, atm_vol: f64, conventions: &FxConventions) -> f64 {
    match conventions.atm {
        AtmConvention::Forward => market.forward,
        AtmConvention::DeltaNeutralStraddle => {
            let half_var = 0.5 * atm_vol * atm_vol * market.tau;
            if conventions.premium_adjusted {
                market.forward * (-half_var).exp()
            } else {
                market.forward * half_var.exp()
            }
        }
    }
}

fn strike_from_d1(forward: f64, d1: f64, s: f64) -> f64 {
    forward * (-d1 * s + 0.5 * s * s).exp()
}

fn strike_from_d2(forward: f64, d2: f64, s: f64) -> f64 {
    forward * (-d2 * s - 0.5 * s * s).exp()
}

fn check_strike(strike: f64, delta: f64) -> Result<f64> {
    if strike.is_finite() && strike > 0.0 {
        Ok(strike)
    } else {
        Err(RndError::conversion(format!(
            "delta {delta} produced an invalid strike {strike}"
        )))
    }
}

/// Inverts [`fx_delta`] for the strike.
///
/// `delta` is signed: positive for calls, negative for puts. Without premium
/// adjustment the inversion is closed-form; with it a Brent search runs under
/// `solver`, and a failure to bracket or converge is a conversion error.
pub fn strike_from_delta(
    market: &FxMarket,
    delta: f64,
    vol: f64,
    is_call: bool,
    conventions: &FxConventions,
    solver: &SolverSettings,
) -> Result<f64> {
    if !(vol.is_finite() && vol > 0.0) {
        return Err(RndError::conversion(format!("non-positive vol {vol}")));
    }
    if is_call != (delta > 0.0) {
        return Err(RndError::conversion(format!(
            "delta {delta} has the wrong sign for a {}",
            if is_call { "call" } else { "put" }
        )));
    }
    let df = market.delta_discount(conventions);
    let s = vol * market.tau.sqrt();
    let target = delta.abs() / df;
    if target >= 1.0 {
        return Err(RndError::conversion(format!(
            "delta {delta} exceeds the discount factor {df}"
        )));
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| RndError::conversion(e.to_string()))?;
    let d1 = if is_call {
        normal.inverse_cdf(target)
    } else {
        -normal.inverse_cdf(target)
    };
    let unadjusted = strike_from_d1(market.forward, d1, s);
    if !conventions.premium_adjusted {
        return check_strike(unadjusted, delta);
    }

    let f = |k: f64| fx_delta(market, k, vol, is_call, conventions) - delta;
    let mut convergency = SimpleConvergency {
        eps: solver.tolerance,
        max_iter: solver.max_iterations,
    };

    let (lo, hi) = if is_call {
        premium_adjusted_call_bracket(market, vol, delta, df, s, unadjusted, &f)?
    } else {
        // put delta is monotone in strike and the adjusted strike lies below
        // the unadjusted one
        (strike_from_d2(market.forward, 12.0, s), unadjusted)
    };

    let strike = find_root_brent(lo, hi, &f, &mut convergency).map_err(|e| {
        RndError::conversion(format!(
            "no strike for delta {delta} at vol {vol} in [{lo:.6}, {hi:.6}]: {e:?}"
        ))
    })?;
    check_strike(strike, delta)
}

/// Bracket for the premium-adjusted call: from the strike of maximal delta to
/// the first strike whose delta drops below the target.
fn premium_adjusted_call_bracket(
    market: &FxMarket,
    vol: f64,
    delta: f64,
    df: f64,
    s: f64,
    unadjusted: f64,
    f: &impl Fn(f64) -> f64,
) -> Result<(f64, f64)> {
    // the adjusted delta df * e^{-d2 s - s^2/2} N(d2) peaks where s N(d2) = n(d2)
    let peak = |d2: f64| s * norm_cdf(d2) - norm_pdf(d2);
    let mut convergency = SimpleConvergency {
        eps: 1e-12,
        max_iter: 200,
    };
    let d2_star = find_root_brent(-10.0, 10.0, &peak, &mut convergency)
        .map_err(|e| RndError::conversion(format!("delta maximum not found: {e:?}")))?;
    let k_min = strike_from_d2(market.forward, d2_star, s);
    if f(k_min) < 0.0 {
        let max_delta = df * (k_min / market.forward) * norm_cdf(d2_star);
        return Err(RndError::conversion(format!(
            "call delta {delta} unreachable at vol {vol}: maximum premium-adjusted delta is {max_delta:.6}"
        )));
    }
    let mut hi = unadjusted.max(k_min);
    let mut steps = 0;
    while f(hi) > 0.0 {
        hi *= 1.5;
        steps += 1;
        if steps > 60 || !hi.is_finite() {
            return Err(RndError::conversion(format!(
                "could not bracket call strike for delta {delta}"
            )));
        }
    }
    Ok((k_min, hi))
}
