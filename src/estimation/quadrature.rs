//! Uniform grids and composite Simpson quadrature.

use crate::error::{RndError, Result};

/// `lower, lower + step, ..., upper` with the last node snapped onto `upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformGrid {
    pub lower: f64,
    pub step: f64,
    /// Number of intervals.
    pub intervals: usize,
}

impl UniformGrid {
    pub fn new(lower: f64, upper: f64, step: f64) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite() && step > 0.0) {
            return Err(RndError::invalid(format!(
                "bad grid [{lower}, {upper}] with step {step}"
            )));
        }
        if upper <= lower {
            return Err(RndError::invalid(format!(
                "grid upper bound {upper} not above lower bound {lower}"
            )));
        }
        let intervals = ((upper - lower) / step).round().max(1.0) as usize;
        Ok(Self {
            lower,
            step: (upper - lower) / intervals as f64,
            intervals,
        })
    }

    pub fn upper(&self) -> f64 {
        self.lower + self.step * self.intervals as f64
    }

    pub fn node_count(&self) -> usize {
        self.intervals + 1
    }

    pub fn node(&self, i: usize) -> f64 {
        self.lower + self.step * i as f64
    }

    /// Index of the node nearest to `x`, if `x` lies on the grid's span.
    pub fn nearest_index(&self, x: f64) -> Option<usize> {
        let pos = (x - self.lower) / self.step;
        if pos < -0.5 || pos > self.intervals as f64 + 0.5 {
            return None;
        }
        Some((pos.round().max(0.0) as usize).min(self.intervals))
    }

    pub fn nodes(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.node_count()).map(move |i| self.node(i))
    }
}

/// Composite Simpson over equally spaced samples `ys` with spacing `h`.
///
/// An odd number of intervals gets Simpson on all but the last one and the
/// trapezoid rule on the last. Fewer than two samples integrate to zero.
pub fn simpson(ys: &[f64], h: f64) -> f64 {
    let n = ys.len().saturating_sub(1);
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return 0.5 * h * (ys[0] + ys[1]);
    }
    let even = n - n % 2;
    let mut odd_sum = 0.0;
    let mut even_sum = 0.0;
    for i in 1..even {
        if i % 2 == 1 {
            odd_sum += ys[i];
        } else {
            even_sum += ys[i];
        }
    }
    let mut total = h / 3.0 * (ys[0] + 4.0 * odd_sum + 2.0 * even_sum + ys[even]);
    if even < n {
        total += 0.5 * h * (ys[n - 1] + ys[n]);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn simpson_is_exact_for_cubics() {
        let grid = UniformGrid::new(0.0, 2.0, 0.25).unwrap();
        let ys: Vec<f64> = grid.nodes().map(|x| x * x * x - x + 1.0).collect();
        assert_relative_eq!(simpson(&ys, grid.step), 4.0 - 2.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn odd_interval_count_uses_trapezoid_tail() {
        let ys: Vec<f64> = (0..4).map(|i| 2.0 * i as f64).collect(); // y = 2x on [0, 3]
        assert_relative_eq!(simpson(&ys, 1.0), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn grid_snaps_onto_upper_bound() {
        let grid = UniformGrid::new(85.0, 200.0, 1e-4).unwrap();
        assert_eq!(grid.intervals, 1_150_000);
        assert_relative_eq!(grid.upper(), 200.0, epsilon = 1e-9);
        assert_eq!(grid.nearest_index(95.0), Some(100_000));
        assert_eq!(grid.nearest_index(80.0), None);
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        assert!(UniformGrid::new(1.0, 1.0, 0.1).is_err());
        assert!(UniformGrid::new(0.0, 1.0, 0.0).is_err());
    }
}
