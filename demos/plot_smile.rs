// Example: plot_smile.rs
// Builds the five-point smile of one snapshot, fits it and writes smile.svg
// comparing the fitted curve with the market points.
//
// Usage:
//     cargo run --example plot_smile -- [quotes.csv "2022-02-24 10:00:00+03:00"] [spline]
//
// Without arguments the snapshot observed on 28 Feb 2022 is used.

use std::env;

use anyhow::{anyhow, Result};
use rnd_lib::logging::DEFAULT_FILTER;
use rnd_lib::visuals::plot_smile;
use rnd_lib::{
    build_snapshots, default_configs, fit_smile, init_logging, parse_timestamp, EstimationConfig,
    MarketSnapshot, QuoteTable, SmileSource,
};

fn sample_snapshot() -> Result<MarketSnapshot> {
    Ok(MarketSnapshot {
        timestamp: parse_timestamp("2022-02-28 16:44:00+01:00")?,
        spot: 109.3052,
        forward: 112.4394,
        r_base: 0.002354,
        r_counter: 0.346508,
        v_atm: 0.854825,
        v_25r: 0.2132,
        v_10r: 0.4603,
        v_25b: 0.03775,
        v_10b: 0.146675,
    })
}

fn main() -> Result<()> {
    init_logging(DEFAULT_FILTER);
    let args: Vec<String> = env::args().skip(1).collect();

    let snapshot = match (args.first(), args.get(1)) {
        (Some(path), Some(ts)) if path.ends_with(".csv") => {
            let ts = parse_timestamp(ts)?;
            let set = build_snapshots(&QuoteTable::from_csv_path(path)?)?;
            set.snapshots
                .into_iter()
                .find(|s| s.timestamp == ts)
                .ok_or_else(|| anyhow!("no complete snapshot at {ts}"))?
        }
        _ => sample_snapshot()?,
    };

    let mut config: EstimationConfig = default_configs::estimation(default_configs::fast());
    if args.iter().any(|a| a == "spline") {
        config.smile.source = SmileSource::CubicSpline;
    }

    let (smile, input) = fit_smile(&snapshot, &config)?;
    println!("Fitted {} smile at {}", smile.model_name(), snapshot.timestamp);
    println!("Strike | Market IV% | Model IV% | Diff%");
    for p in &input.points {
        let model = smile.vol(p.strike)?;
        println!(
            "{:.4} | {:.2} | {:.2} | {:.2}",
            p.strike,
            p.vol * 100.0,
            model * 100.0,
            (model - p.vol) * 100.0
        );
    }

    plot_smile("smile.svg", &smile, &input)?;
    println!("Chart saved to smile.svg");
    Ok(())
}
