// Example: estimate_batch.rs
// Runs the three batch estimators over a processed long-form quote CSV
// (`date,name,value`) and writes CSV series plus SVG charts.
//
// Usage:
//     cargo run --example estimate_batch -- <quotes.csv> [config.toml] [out_dir]
//
// Set RUST_LOG=rnd_lib=debug for per-timestamp detail.

use std::env;
use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rnd_lib::logging::DEFAULT_FILTER;
use rnd_lib::visuals::{plot_rates, plot_series, plot_spot};
use rnd_lib::{
    estimate_mfiv, estimate_probability, estimate_probability_multiple_levels, init_logging,
    parse_timestamp, BatchInput, BatchOptions, EstimationConfig, EstimatorKind, Instrument,
    QuoteTable,
};

fn main() -> Result<()> {
    init_logging(DEFAULT_FILTER);

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!(
            "Usage: {} <quotes.csv> [config.toml] [out_dir]",
            args.first().map(String::as_str).unwrap_or("estimate_batch")
        );
    }
    let quotes = QuoteTable::from_csv_path(&args[1])
        .with_context(|| format!("reading quotes from {}", args[1]))?;
    let config = match args.get(2) {
        Some(path) => EstimationConfig::from_toml_path(path)
            .with_context(|| format!("reading config from {path}"))?,
        None => EstimationConfig::default(),
    };
    let out_dir = PathBuf::from(args.get(3).map(String::as_str).unwrap_or("rnd_out"));
    fs::create_dir_all(&out_dir)?;

    println!(
        "Loaded {} quotes over {} timestamps",
        quotes.len(),
        quotes.timestamps().len()
    );

    let input = BatchInput::from_quotes(&quotes, &config)?;
    let options = BatchOptions::parallel().with_cache(out_dir.join("cache"));

    let mf = estimate_probability(&input, EstimatorKind::ModelFreeProbability, &config, &options)?;
    let lnmix = estimate_probability(&input, EstimatorKind::ParametricMixture, &config, &options)?;
    let levels = estimate_probability_multiple_levels(
        &input,
        EstimatorKind::ModelFreeProbability,
        None,
        &config,
        &options,
    )?;
    let variance = estimate_mfiv(&input, &config, &options)?;

    mf.write_csv(File::create(out_dir.join("p_model_free.csv"))?)?;
    lnmix.write_csv(File::create(out_dir.join("p_lognormal_mixture.csv"))?)?;
    levels.write_csv(File::create(out_dir.join("p_levels.csv"))?)?;
    variance.write_csv(File::create(out_dir.join("variance.csv"))?)?;

    for (name, series) in [("model-free", &mf), ("mixture", &lnmix), ("variance", &variance)] {
        println!(
            "{name}: {} estimates, {} failures",
            series.values().len(),
            series.failures().len()
        );
        for (ts, failure) in series.failures().iter().take(5) {
            println!("  {ts}: {:?} {}", failure.kind, failure.message);
        }
    }

    // announcement, Moscow time; only marked when inside the sample
    let announcement = parse_timestamp("2022-02-24 05:50:00+03:00")?;
    let timestamps = input.timestamps();
    let marker = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) if *first <= announcement && announcement <= *last => {
            Some(announcement)
        }
        _ => None,
    };
    plot_series(out_dir.join("p_model_free.svg"), &mf, marker)?;
    plot_series(out_dir.join("variance.svg"), &variance, marker)?;
    plot_spot(out_dir.join("spot.svg"), &quotes.series(Instrument::Spot), marker)?;
    plot_rates(
        out_dir.join("rates.svg"),
        &quotes.series(Instrument::RBase),
        &quotes.series(Instrument::RCounter),
        marker,
    )?;

    println!("Results written to {}", out_dir.display());
    Ok(())
}
