
use approx::assert_relative_eq;
use rnd_lib::models::fx::{fx_delta, AtmConvention, FxMarket};
use rnd_lib::models::sabr::{fit_sabr, SabrSmile};
use rnd_lib::models::traits::SmileModel;
use rnd_lib::{
    fit_smile, Extrapolation, FittedSmile, FxConventions, SabrBeta, SabrParams, SmileBuilder,
    SmileConfig, SmileInput, SmileSource, StrikeVol,
};
use test_utils::{create_test_config, default_config, sample_snapshot, test_config, timestamp};

const TAU: f64 = 1.0 / 12.0;

fn all_conventions() -> Vec<FxConventions> {
    let mut out = Vec::new();
    for premium_adjusted in [true, false] {
        for forward_delta in [true, false] {
            out.push(FxConventions {
                atm: AtmConvention::DeltaNeutralStraddle,
                premium_adjusted,
                forward_delta,
            });
        }
    }
    out
}

#[test]
fn test_builder_yields_five_pillars_for_every_convention() {
    let snap = sample_snapshot(timestamp(0));
    for conventions in all_conventions() {
        let pillars = SmileBuilder::new(conventions, TAU).build(&snap).unwrap();
        assert_eq!(pillars.len(), 5);
        assert!(pillars.iter().all(|p| p.strike > 0.0 && p.strike.is_finite()));
        assert!(pillars.windows(2).all(|w| w[0].strike < w[1].strike));
        // ATM vol is passed through untouched
        assert_eq!(pillars[2].vol, snap.v_atm);

        let market = FxMarket {
            spot: snap.spot,
            forward: snap.forward,
            r_base: snap.r_base,
            tau: TAU,
        };
        for p in pillars.iter().filter(|p| p.delta != 0.0) {
            let d = fx_delta(&market, p.strike, p.vol, p.delta > 0.0, &conventions);
            assert_relative_eq!(d, p.delta, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_decomposed_wing_vols() {
    let snap = sample_snapshot(timestamp(0));
    let pillars = SmileBuilder::new(FxConventions::default(), TAU)
        .build(&snap)
        .unwrap();
    let expected = [
        snap.v_atm + snap.v_10b - snap.v_10r / 2.0,
        snap.v_atm + snap.v_25b - snap.v_25r / 2.0,
        snap.v_atm,
        snap.v_atm + snap.v_25b + snap.v_25r / 2.0,
        snap.v_atm + snap.v_10b + snap.v_10r / 2.0,
    ];
    for (p, v) in pillars.iter().zip(expected) {
        assert_relative_eq!(p.vol, v, epsilon = 1e-12);
    }
}

fn sabr_generated_input(truth: SabrParams, forward: f64, tau: f64) -> SmileInput {
    let smile = SabrSmile::new(truth, forward, tau).unwrap();
    let strikes = [75.0, 88.0, 100.0, 112.0, 130.0];
    SmileInput {
        timestamp: timestamp(0),
        forward,
        r_counter: 0.05,
        r_base: 0.01,
        points: strikes
            .iter()
            .zip(smile.implied_vols(&strikes))
            .map(|(&strike, vol)| StrikeVol { strike, vol })
            .collect(),
    }
}

#[test]
fn test_sabr_round_trip_with_fixed_beta() {
    let (forward, tau) = (100.0, 0.25);
    let truth = SabrParams::new(2.0, 0.5, -0.3, 0.8).unwrap();
    let input = sabr_generated_input(truth, forward, tau);

    let fit = fit_sabr(&input, tau, SabrBeta::Fixed(0.5), &create_test_config(), 1e-3).unwrap();
    let p = fit.smile.params;
    println!("recovered SABR: {p:?}, rmse {:.2e}", fit.rmse);
    assert_eq!(p.beta, 0.5);
    assert_relative_eq!(p.alpha, truth.alpha, max_relative = 5e-3);
    assert_relative_eq!(p.rho, truth.rho, epsilon = 2e-2);
    assert_relative_eq!(p.nu, truth.nu, max_relative = 2e-2);
    assert!(fit.rmse < 1e-3);
}

#[test]
fn test_sabr_round_trip_with_free_beta() {
    // beta and rho trade off on five points, so check the smile rather than
    // the individual parameters
    let (forward, tau) = (100.0, 0.25);
    let truth = SabrParams::new(2.0, 0.5, -0.3, 0.8).unwrap();
    let input = sabr_generated_input(truth, forward, tau);
    let smile = SabrSmile::new(truth, forward, tau).unwrap();

    let fit = fit_sabr(&input, tau, SabrBeta::Free, &default_config().optimizer, 1e-3).unwrap();
    let p = fit.smile.params;
    println!("free-beta SABR: {p:?}, rmse {:.2e}", fit.rmse);
    assert!((0.0..=1.0).contains(&p.beta));
    assert!(fit.rmse < 1e-3);
    for k in [80.0, 95.0, 105.0, 125.0] {
        assert_relative_eq!(fit.smile.implied_vol(k), smile.implied_vol(k), epsilon = 2e-3);
    }
}

#[test]
fn test_default_sabr_smile_on_sample_snapshot() {
    let config = default_config();
    let snap = sample_snapshot(timestamp(0));
    let (smile, input) = fit_smile(&snap, &config).unwrap();
    assert_eq!(smile.model_name(), "sabr");
    assert_eq!(smile.extrapolation, Extrapolation::Natural);
    for p in &input.points {
        let tolerance = 3.0 * config.smile.max_rmse;
        assert_relative_eq!(smile.vol(p.strike).unwrap(), p.vol, epsilon = tolerance);
    }
    // the density grid reaches 200, past the 10-delta call
    assert!(input.points[4].strike < 200.0);
    let far = smile.vol(200.0).unwrap();
    assert!(far.is_finite() && far > 0.0);
}

#[test]
fn test_spline_smile_on_sample_snapshot() {
    let snap = sample_snapshot(timestamp(0));
    let (smile, input) = fit_smile(&snap, &test_config()).unwrap();
    assert_eq!(smile.model_name(), "cubic_spline");
    for p in &input.points {
        assert_relative_eq!(smile.vol(p.strike).unwrap(), p.vol, epsilon = 1e-12);
    }
    // far wings stay usable under the natural policy
    assert!(smile.vol(60.0).unwrap() > 0.0);
    assert!(smile.vol(199.0).unwrap() > 0.0);
}

#[test]
fn test_forbidden_extrapolation_is_an_error() {
    let snap = sample_snapshot(timestamp(0));
    let input = SmileBuilder::new(FxConventions::default(), TAU)
        .smile_input(&snap)
        .unwrap();
    let config = SmileConfig {
        source: SmileSource::CubicSpline,
        extrapolation: Extrapolation::Forbid,
        ..SmileConfig::default()
    };
    let smile = FittedSmile::spline(&input, &config).unwrap();
    assert!(smile.vol(input.points[0].strike - 1.0).is_err());
    assert!(smile.vol(input.forward).is_ok());
}
