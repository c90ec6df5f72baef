use serde::{Deserialize, Serialize};

/// CMA-ES specific configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmaEsConfig {
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// Whether to evaluate the population in parallel
    pub parallel_eval: bool,
    /// Verbosity level of the optimiser itself (0=silent, 1=minimal, 2=normal)
    pub verbosity: u8,
    /// Number of IPOP restarts (0 = no IPOP)
    pub ipop_restarts: usize,
    /// Factor to increase population size in IPOP restarts
    pub ipop_increase_factor: f64,
    /// Number of BIPOP restarts (0 = no BIPOP)
    pub bipop_restarts: usize,
    /// Enable L-BFGS-B refinement after CMA-ES?
    pub lbfgsb_enabled: bool,
    /// Max iterations for L-BFGS-B
    pub lbfgsb_max_iterations: usize,
    /// Total function evaluations budget
    pub total_evals_budget: usize,
    /// Whether to use advanced sub-run budgeting logic
    pub use_subrun_budgeting: bool,
    /// Run a CMA-ES around the initial guess instead of starting L-BFGS-B from it
    pub mini_cmaes_on_refinement: bool,
}

impl Default for CmaEsConfig {
    fn default() -> Self {
        Self {
            seed: Some(123456),
            // batches already spread timestamps over the worker pool
            parallel_eval: false,
            verbosity: 0,
            ipop_restarts: 0,
            ipop_increase_factor: 2.0,
            bipop_restarts: 2,
            lbfgsb_enabled: true,
            lbfgsb_max_iterations: 200,
            total_evals_budget: 20000,
            use_subrun_budgeting: false,
            mini_cmaes_on_refinement: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveBoundsConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    pub proximity_threshold: f64,
    pub expansion_factor: f64,
}

impl Default for AdaptiveBoundsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: 3,
            proximity_threshold: 0.1, // 10% from edge
            expansion_factor: 0.25,   // expand by 25%
        }
    }
}

/// Main configuration struct for optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// L-BFGS-B convergence tolerance
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// CMA-ES population size
    #[serde(default = "default_pop_size")]
    pub pop_size: usize,

    /// Maximum CMA-ES generations per run
    #[serde(default = "default_max_gen")]
    pub max_gen: usize,

    /// CMA-ES specific configuration
    #[serde(default)]
    pub cmaes: CmaEsConfig,

    /// Adaptive bounds configuration
    #[serde(default)]
    pub adaptive_bounds: AdaptiveBoundsConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            pop_size: default_pop_size(),
            max_gen: default_max_gen(),
            cmaes: CmaEsConfig::default(),
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }
}

impl OptimizationConfig {
    /// Default configuration for production calibration with high accuracy
    pub fn production() -> Self {
        Self {
            tolerance: 1e-10,
            pop_size: 25,
            max_gen: 150,
            cmaes: CmaEsConfig {
                bipop_restarts: 5,
                total_evals_budget: 100000,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig {
                enabled: true,
                ..AdaptiveBoundsConfig::default()
            },
        }
    }

    /// Fast configuration for development and testing
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-8,
            pop_size: 16,
            max_gen: 60,
            cmaes: CmaEsConfig {
                bipop_restarts: 1,
                total_evals_budget: 5000,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }

    /// High-precision configuration for research and backtesting
    pub fn research() -> Self {
        Self {
            tolerance: 1e-12,
            pop_size: 60,
            max_gen: 300,
            cmaes: CmaEsConfig {
                bipop_restarts: 5,
                ipop_restarts: 3,
                total_evals_budget: 500000,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig {
                enabled: true,
                ..AdaptiveBoundsConfig::default()
            },
        }
    }

    /// Minimal configuration for quick validation and debugging
    pub fn minimal() -> Self {
        Self {
            tolerance: 1e-6,
            pop_size: 10,
            max_gen: 20,
            cmaes: CmaEsConfig {
                bipop_restarts: 0,
                total_evals_budget: 1000,
                ..CmaEsConfig::default()
            },
            adaptive_bounds: AdaptiveBoundsConfig::default(),
        }
    }
}

fn default_tolerance() -> f64 {
    1e-10
}

fn default_pop_size() -> usize {
    20
}

fn default_max_gen() -> usize {
    100
}
