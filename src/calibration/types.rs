use serde::{Deserialize, Serialize};

/// Model calibrator trait for parameter optimization.
///
/// A calibrator owns the targets it is fitted to; the optimiser only sees a
/// parameter vector and a scalar objective.
pub trait ModelCalibrator: Send + Sync {
    /// Returns the name of the model (e.g., "sabr")
    fn model_name(&self) -> &'static str;

    /// How many parameters are in the model's optimization vector
    fn param_count(&self) -> usize;

    /// Returns the vector of (min, max) bounds for each parameter
    fn param_bounds(&self) -> &[(f64, f64)];

    /// Objective value at `x`; must stay finite, inadmissible points get a
    /// large penalty instead of NaN.
    fn evaluate_objective(&self, x: &[f64]) -> f64;

    /// Returns parameter names in the order they appear in the optimization vector
    fn param_names(&self) -> Vec<&'static str>;

    /// Starting point for the search, if the model has a natural one.
    fn initial_guess(&self) -> Option<Vec<f64>> {
        None
    }

    /// Expand internal parameter bounds if parameters are near current bounds.
    /// Returns true if any bound was adjusted.
    fn expand_bounds_if_needed(
        &mut self,
        _params: &[f64],
        _proximity_threshold: f64,
        _expansion_factor: f64,
    ) -> bool {
        false
    }
}

/// Outcome of one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub objective: f64,
    pub params: Vec<f64>,
    /// Bounds in force at the end of the run (they may have been widened).
    pub bounds: Vec<(f64, f64)>,
}

impl CalibrationOutcome {
    /// True when every parameter sits inside its bounds and the objective is finite.
    pub fn is_admissible(&self) -> bool {
        self.objective.is_finite()
            && self.params.len() == self.bounds.len()
            && self
                .params
                .iter()
                .zip(&self.bounds)
                .all(|(p, (lo, hi))| p.is_finite() && *p >= *lo && *p <= *hi)
    }
}
