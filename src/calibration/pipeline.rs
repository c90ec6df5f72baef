use cmaes_lbfgsb::cmaes::{canonical_cmaes_optimize, CmaesCanonicalConfig};
use cmaes_lbfgsb::lbfgsb_optimize::lbfgsb_optimize;
use tracing::{debug, trace};

use crate::calibration::config::OptimizationConfig;
use crate::calibration::types::{CalibrationOutcome, ModelCalibrator};

fn cmaes_config(config: &OptimizationConfig) -> CmaesCanonicalConfig {
    CmaesCanonicalConfig {
        population_size: config.pop_size,
        max_generations: config.max_gen,
        seed: config.cmaes.seed.unwrap_or(123456),
        c1: None,
        c_mu: None,
        c_sigma: None,
        d_sigma: None,
        parallel_eval: config.cmaes.parallel_eval,
        verbosity: config.cmaes.verbosity,
        ipop_restarts: config.cmaes.ipop_restarts,
        ipop_increase_factor: config.cmaes.ipop_increase_factor,
        bipop_restarts: config.cmaes.bipop_restarts,
        total_evals_budget: config.cmaes.total_evals_budget,
        use_subrun_budgeting: config.cmaes.use_subrun_budgeting,
        alpha_mu: None,
        hsig_threshold_factor: None,
        bipop_small_population_factor: None,
        bipop_small_budget_factor: None,
        bipop_large_budget_factor: None,
        bipop_large_pop_increase_factor: None,
        max_bound_iterations: None,
        eig_precision_threshold: None,
        min_eig_value: None,
        matrix_op_threshold: None,
        stagnation_limit: None,
        min_sigma: None,
    }
}

/// CMA-ES for the global search, then L-BFGS-B to polish the best point.
pub fn calibrate_model(
    model: &dyn ModelCalibrator,
    config: &OptimizationConfig,
    initial_guess: Option<Vec<f64>>,
) -> (f64, Vec<f64>) {
    let bounds = model.param_bounds();
    let obj_fn = |x: &[f64]| model.evaluate_objective(x);

    // 1) global search, centred on the guess when there is one
    let (best_obj, best_sol) = match initial_guess {
        Some(guess) if !config.cmaes.mini_cmaes_on_refinement => {
            let guess_obj = obj_fn(&guess);
            debug!(
                model = model.model_name(),
                guess_obj, "skipping CMA-ES, refining initial guess"
            );
            (guess_obj, guess)
        }
        guess => {
            debug!(
                model = model.model_name(),
                seeded = guess.is_some(),
                "running CMA-ES"
            );
            let seed = guess.clone();
            let result = canonical_cmaes_optimize(obj_fn, bounds, cmaes_config(config), guess);
            let (_, params) = result.best_solution;
            let found = (obj_fn(&params), params);
            // never end up worse than the point we were handed
            match seed {
                Some(seed) => {
                    let seed_obj = obj_fn(&seed);
                    if seed_obj < found.0 {
                        (seed_obj, seed)
                    } else {
                        found
                    }
                }
                None => found,
            }
        }
    };

    // 2) local refinement
    if !config.cmaes.lbfgsb_enabled {
        return (best_obj, best_sol);
    }

    let mut refined_solution = best_sol.clone();
    let refine_res = lbfgsb_optimize(
        &mut refined_solution,
        bounds,
        &obj_fn,
        config.cmaes.lbfgsb_max_iterations,
        config.tolerance,
        if config.cmaes.verbosity >= 1 {
            Some(|_current_x: &[f64], current_obj: f64| {
                trace!(current_obj, "L-BFGS-B iteration");
            })
        } else {
            None
        },
        None,
    );

    match refine_res {
        Ok((loc_obj, loc_sol)) if loc_obj < best_obj => {
            debug!(from = best_obj, to = loc_obj, "L-BFGS-B improved objective");
            (loc_obj, loc_sol)
        }
        Ok(_) => (best_obj, best_sol),
        Err(e) => {
            debug!(error = ?e, "L-BFGS-B failed, keeping CMA-ES solution");
            (best_obj, best_sol)
        }
    }
}

/// Repeats [`calibrate_model`] while the model widens bounds its solution
/// presses against, keeping the best run.
pub fn calibrate_model_adaptive(
    model: &mut dyn ModelCalibrator,
    config: &OptimizationConfig,
    initial_guess: Option<Vec<f64>>,
) -> CalibrationOutcome {
    if !config.adaptive_bounds.enabled {
        let (objective, params) = calibrate_model(&*model, config, initial_guess);
        return CalibrationOutcome {
            objective,
            params,
            bounds: model.param_bounds().to_vec(),
        };
    }

    let mut best_obj = f64::MAX;
    let mut best_params = Vec::new();

    for iter in 0..config.adaptive_bounds.max_iterations {
        let (obj, params) = calibrate_model(&*model, config, initial_guess.clone());
        if obj < best_obj {
            best_obj = obj;
            best_params = params.clone();
        }
        let adjusted = model.expand_bounds_if_needed(
            &params,
            config.adaptive_bounds.proximity_threshold,
            config.adaptive_bounds.expansion_factor,
        );
        debug!(iteration = iter + 1, adjusted, objective = obj, "adaptive bounds pass");
        if !adjusted {
            break;
        }
    }

    CalibrationOutcome {
        objective: best_obj,
        params: best_params,
        bounds: model.param_bounds().to_vec(),
    }
}
