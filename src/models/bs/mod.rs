// Black (1976) pricing on the forward, which for FX options is the
// Garman-Kohlhagen price once the forward is F = S * exp((r_d - r_f) T).
// Greeks other than the FX deltas in `models::fx` are left out.

pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

pub(crate) fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn d1_d2(forward: f64, strike: f64, tau: f64, sigma: f64) -> (f64, f64) {
    let sig_sqrt_t = sigma * tau.sqrt();
    let d1 = ((forward / strike).ln() + 0.5 * sig_sqrt_t * sig_sqrt_t) / sig_sqrt_t;
    (d1, d1 - sig_sqrt_t)
}

/// Undiscounted-forward call price, discounted at the counter-currency rate.
#[allow(non_snake_case)]
pub fn black_call_price(F: f64, K: f64, r: f64, T: f64, sigma: f64) -> f64 {
    let df = (-r * T).exp();
    if T <= 0.0 || sigma <= 0.0 {
        return df * (F - K).max(0.0);
    }
    let (d1, d2) = d1_d2(F, K, T, sigma);
    df * (F * norm_cdf(d1) - K * norm_cdf(d2))
}

#[allow(non_snake_case)]
pub fn black_put_price(F: f64, K: f64, r: f64, T: f64, sigma: f64) -> f64 {
    let df = (-r * T).exp();
    if T <= 0.0 || sigma <= 0.0 {
        return df * (K - F).max(0.0);
    }
    let (d1, d2) = d1_d2(F, K, T, sigma);
    df * (K * norm_cdf(-d2) - F * norm_cdf(-d1))
}

/// Price of the out-of-the-money option at `K`: put below the forward, call
/// at or above it.
#[allow(non_snake_case)]
pub fn otm_price(F: f64, K: f64, r: f64, T: f64, sigma: f64) -> f64 {
    if K < F {
        black_put_price(F, K, r, T, sigma)
    } else {
        black_call_price(F, K, r, T, sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn put_call_parity_holds() {
        let (f, r, t, s) = (112.44, 0.3465, 1.0 / 12.0, 0.85);
        for k in [90.0, 105.0, 112.44, 130.0] {
            let c = black_call_price(f, k, r, t, s);
            let p = black_put_price(f, k, r, t, s);
            assert_relative_eq!(c - p, (-r * t).exp() * (f - k), epsilon = 1e-10);
        }
    }

    #[test]
    fn atm_call_matches_closed_form() {
        // ATM forward: C = df * F * (2 N(sigma sqrt(T) / 2) - 1)
        let (f, r, t, s) = (100.0, 0.05, 0.5, 0.2);
        let expected = (-r * t).exp() * f * (2.0 * norm_cdf(0.5 * s * t.sqrt()) - 1.0);
        assert_relative_eq!(black_call_price(f, f, r, t, s), expected, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_inputs_fall_back_to_intrinsic() {
        assert_eq!(black_call_price(100.0, 90.0, 0.0, 0.0, 0.2), 10.0);
        assert_eq!(black_put_price(100.0, 90.0, 0.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn otm_price_switches_at_forward() {
        let (f, r, t, s) = (100.0, 0.01, 0.25, 0.3);
        assert_eq!(otm_price(f, 90.0, r, t, s), black_put_price(f, 90.0, r, t, s));
        assert_eq!(otm_price(f, 110.0, r, t, s), black_call_price(f, 110.0, r, t, s));
    }

    #[test]
    fn pdf_and_cdf_are_consistent() {
        assert_relative_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-15);
        let h = 1e-5;
        let numeric = (norm_cdf(0.7 + h) - norm_cdf(0.7 - h)) / (2.0 * h);
        assert_relative_eq!(numeric, norm_pdf(0.7), epsilon = 1e-8);
    }
}
