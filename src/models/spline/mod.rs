//! Natural cubic spline through the smile points, vol against strike.

use serde::{Deserialize, Serialize};

use crate::error::{RndError, Result};
use crate::models::traits::SmileModel;

/// Natural cubic spline: zero second derivative at both knots ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Knots must be strictly increasing; at least two are needed.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(RndError::invalid(format!(
                "spline needs as many values as knots, got {} and {}",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(RndError::invalid("spline needs at least two knots"));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) || xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(RndError::invalid(
                "spline knots must be finite and strictly increasing",
            ));
        }

        let n = xs.len();
        let mut m = vec![0.0; n];
        if n > 2 {
            // tridiagonal system for the interior second derivatives
            let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
            let mut diag = vec![0.0; n];
            let mut rhs = vec![0.0; n];
            for i in 1..n - 1 {
                diag[i] = 2.0 * (h[i - 1] + h[i]);
                rhs[i] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
            }
            // Thomas algorithm, forward sweep
            for i in 2..n - 1 {
                let w = h[i - 1] / diag[i - 1];
                diag[i] -= w * h[i - 1];
                rhs[i] -= w * rhs[i - 1];
            }
            for i in (1..n - 1).rev() {
                let upper = if i + 1 < n - 1 { h[i] * m[i + 1] } else { 0.0 };
                m[i] = (rhs[i] - upper) / diag[i];
            }
        }
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m,
        })
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    fn segment(&self, x: f64) -> usize {
        let i = self.xs.partition_point(|&k| k <= x);
        i.clamp(1, self.xs.len() - 1) - 1
    }

    /// Cubic value for `x` inside the knots; outside, the end cubic is
    /// continued.
    pub fn value(&self, x: f64) -> f64 {
        let i = self.segment(x);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let h = x1 - x0;
        let a = (x1 - x) / h;
        let b = (x - x0) / h;
        a * self.ys[i]
            + b * self.ys[i + 1]
            + ((a * a * a - a) * self.m[i] + (b * b * b - b) * self.m[i + 1]) * h * h / 6.0
    }

    pub fn derivative(&self, x: f64) -> f64 {
        let i = self.segment(x);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let h = x1 - x0;
        let a = (x1 - x) / h;
        let b = (x - x0) / h;
        (self.ys[i + 1] - self.ys[i]) / h
            + ((1.0 - 3.0 * a * a) * self.m[i] + (3.0 * b * b - 1.0) * self.m[i + 1]) * h / 6.0
    }

    /// Value with straight-line continuation beyond the end knots, matching
    /// the end slopes. The natural boundary makes this C2 at the knots.
    pub fn value_linear_tails(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        if x < lo {
            self.ys[0] + self.derivative(lo) * (x - lo)
        } else if x > hi {
            self.ys[self.ys.len() - 1] + self.derivative(hi) * (x - hi)
        } else {
            self.value(x)
        }
    }
}

impl SmileModel for CubicSpline {
    fn implied_vol(&self, strike: f64) -> f64 {
        self.value(strike)
    }
}
