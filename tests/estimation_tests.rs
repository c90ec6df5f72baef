
use approx::assert_relative_eq;
use proptest::prelude::*;
use rnd_lib::estimation::DensityCurve;
use rnd_lib::{
    probability_for_snapshot, DensityConfig, EstimationConfig, Estimator, EstimatorKind,
    FittedSmile, SmileConfig, SmileSource, VarianceConfig,
};
use statrs::distribution::{ContinuousCDF, Normal};
use test_utils::{
    default_config, flat_input, noisy_input, sample_snapshot, test_config, timestamp,
};

const TAU: f64 = 1.0 / 12.0;

fn spline_config() -> SmileConfig {
    SmileConfig {
        source: SmileSource::CubicSpline,
        ..SmileConfig::default()
    }
}

fn black_tail(forward: f64, strike: f64, vol: f64, tau: f64) -> f64 {
    let s = vol * tau.sqrt();
    let d2 = ((forward / strike).ln() - 0.5 * s * s) / s;
    Normal::new(0.0, 1.0).unwrap().cdf(d2)
}

#[test]
fn test_flat_smile_variance_matches_black() {
    let vol = 0.25;
    let input = flat_input(timestamp(0), 100.0, 0.05, vol);

    let mut config = test_config();
    config.variance = VarianceConfig {
        svix: false,
        lower_bound: 20.0,
        upper_floor: 400.0,
        grid_step: 1e-2,
        ..VarianceConfig::default()
    };
    let mfiv = Estimator::new(EstimatorKind::ModelFreeVariance, config.clone())
        .unwrap()
        .variance(&input)
        .unwrap();
    assert_relative_eq!(mfiv, vol * vol, max_relative = 1e-3);

    config.variance.svix = true;
    let svix = Estimator::new(EstimatorKind::ModelFreeVariance, config)
        .unwrap()
        .variance(&input)
        .unwrap();
    let expected = ((vol * vol * TAU).exp() - 1.0) / TAU;
    assert_relative_eq!(svix, expected, max_relative = 1e-3);
}

#[test]
fn test_flat_smile_probability_matches_black() {
    let input = flat_input(timestamp(0), 100.0, 0.05, 0.3);
    let estimator = Estimator::new(EstimatorKind::ModelFreeProbability, test_config()).unwrap();
    for threshold in [85.0, 100.0, 115.0] {
        let p = estimator.probability(&input, threshold).unwrap();
        assert_relative_eq!(p, black_tail(100.0, threshold, 0.3, TAU), epsilon = 1e-4);
    }
}

#[test]
fn test_mixture_recovers_a_single_lognormal() {
    let input = flat_input(timestamp(0), 100.0, 0.05, 0.3);
    let mut config = test_config();
    config.optimizer.cmaes.mini_cmaes_on_refinement = false;
    let estimator = Estimator::new(EstimatorKind::ParametricMixture, config).unwrap();
    for threshold in [85.0, 100.0, 115.0] {
        let p = estimator.probability(&input, threshold).unwrap();
        assert_relative_eq!(p, black_tail(100.0, threshold, 0.3, TAU), epsilon = 5e-3);
    }
}

#[test]
fn test_multi_level_probabilities_on_sample_snapshot() {
    let config = test_config();
    let thresholds = [85.0, 95.0, 105.0, 115.0, 125.0, 135.0];
    let input = rnd_lib::SmileBuilder::new(config.conventions, config.maturity)
        .smile_input(&sample_snapshot(timestamp(0)))
        .unwrap();
    let estimator = Estimator::new(EstimatorKind::ModelFreeProbability, config).unwrap();
    let row = estimator.probabilities(&input, &thresholds).unwrap();
    assert_eq!(row.len(), 6);
    let probs: Vec<f64> = row.into_iter().map(|p| p.unwrap()).collect();
    println!("P[S > k]: {probs:?}");
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(probs.windows(2).all(|w| w[0] >= w[1]));
}

fn sample_input(config: &EstimationConfig) -> rnd_lib::SmileInput {
    rnd_lib::SmileBuilder::new(config.conventions, config.maturity)
        .smile_input(&sample_snapshot(timestamp(0)))
        .unwrap()
}

fn assert_tail_curve(probs: &[f64]) {
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)), "{probs:?}");
    assert!(probs.windows(2).all(|w| w[0] >= w[1]), "{probs:?}");
}

#[test]
fn test_default_sabr_estimators_on_sample_snapshot() {
    let config = default_config();
    let input = sample_input(&config);
    let thresholds = config.multi_level_thresholds.clone();

    let estimator = Estimator::new(EstimatorKind::ModelFreeProbability, config.clone()).unwrap();
    let probs: Vec<f64> = estimator
        .probabilities(&input, &thresholds)
        .unwrap()
        .into_iter()
        .map(|p| p.unwrap())
        .collect();
    println!("SABR P[S > k]: {probs:?}");
    assert_eq!(probs.len(), 6);
    assert_tail_curve(&probs);
    assert!(probs[0] > 0.75 && probs[0] < 0.95);

    let svix = Estimator::new(EstimatorKind::ModelFreeVariance, config.clone())
        .unwrap()
        .variance(&input)
        .unwrap();
    assert!(svix > 0.0 && svix.is_finite());

    // variance read off the SABR curve instead of the spline
    let mut sabr_variance = config;
    sabr_variance.variance.source = SmileSource::Sabr;
    sabr_variance.variance.svix = false;
    let mfiv = Estimator::new(EstimatorKind::ModelFreeVariance, sabr_variance)
        .unwrap()
        .variance(&input)
        .unwrap();
    assert!(mfiv > 0.0 && mfiv.is_finite());
}

#[test]
fn test_mixture_on_sample_snapshot_agrees_with_model_free() {
    let config = default_config();
    let input = sample_input(&config);
    let thresholds = config.multi_level_thresholds.clone();

    let mixture: Vec<f64> = Estimator::new(EstimatorKind::ParametricMixture, config.clone())
        .unwrap()
        .probabilities(&input, &thresholds)
        .unwrap()
        .into_iter()
        .map(|p| p.unwrap())
        .collect();
    let model_free: Vec<f64> = Estimator::new(EstimatorKind::ModelFreeProbability, config)
        .unwrap()
        .probabilities(&input, &thresholds)
        .unwrap()
        .into_iter()
        .map(|p| p.unwrap())
        .collect();
    println!("mixture {mixture:?}\nmodel-free {model_free:?}");
    assert_tail_curve(&mixture);
    for (a, b) in mixture.iter().zip(&model_free) {
        assert!((a - b).abs() < 0.07, "mixture {a} vs model-free {b}");
    }
}

#[test]
fn test_single_snapshot_probability_uses_the_same_path() {
    let config = test_config();
    let snap = sample_snapshot(timestamp(0));
    let p = probability_for_snapshot(&snap, EstimatorKind::ModelFreeProbability, 85.0, &config)
        .unwrap();
    assert!(p > 0.5 && p < 1.0, "P[S > 85] = {p}");

    let err = probability_for_snapshot(&snap, EstimatorKind::ModelFreeProbability, 250.0, &config)
        .unwrap_err();
    assert!(err.is_systemic());
}

#[test]
fn test_noisy_smile_still_yields_probabilities() {
    let estimator = Estimator::new(EstimatorKind::ModelFreeProbability, test_config()).unwrap();
    for seed in 0..5 {
        let input = noisy_input(seed, 0.005);
        let p = estimator.probability(&input, 85.0).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = EstimationConfig::from_toml_str(
        r#"
        threshold = 95.0

        [smile]
        source = "cubic_spline"
        extrapolation = "flat"

        [density]
        grid_step = 0.001
        "#,
    )
    .unwrap();
    assert_eq!(config.threshold, 95.0);
    assert_eq!(config.smile.source, SmileSource::CubicSpline);
    assert_eq!(config.density.grid_step, 1e-3);
    assert_eq!(config.density.upper_bound, DensityConfig::default().upper_bound);
    assert_eq!(config.multi_level_thresholds.len(), 6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_tail_probability_is_bounded_and_monotone(
        vol in 0.05f64..1.5,
        forward in 70.0f64..150.0,
        rate in 0.0f64..0.4,
        raw_thresholds in prop::collection::vec(60.0f64..190.0, 2..6),
    ) {
        let mut thresholds = raw_thresholds;
        thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let input = flat_input(timestamp(0), forward, rate, vol);
        let smile = FittedSmile::spline(&input, &spline_config()).unwrap();
        let density = DensityConfig {
            grid_step: 1e-2,
            ..DensityConfig::default()
        };
        let curve = DensityCurve::from_smile(&smile, rate, TAU, thresholds[0], &density).unwrap();
        let probs: Vec<f64> = thresholds
            .iter()
            .map(|&t| curve.tail_probability(t).unwrap())
            .collect();
        for p in &probs {
            prop_assert!((0.0..=1.0).contains(p));
        }
        // rounding in the second differences is far below this
        for w in probs.windows(2) {
            prop_assert!(w[0] >= w[1] - 1e-6);
        }
    }
}
