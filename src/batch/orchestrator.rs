//! Batch entry points: smile building and estimation fanned out over every
//! qualifying timestamp, reassembled by timestamp, optionally memoised.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cache::{CacheKey, DiskCache};
use super::results::{
    Cell, EstimateSeries, EstimateTable, EstimationFailure, SeriesEntry, TableRow,
};
use super::scheduler::{TaskOutcome, TaskScheduler};
use super::BatchOptions;
use crate::data::{
    build_snapshots, join_frames, ForwardRow, QuoteTable, RatesRow, SmileInput, StrikeVolRow,
    Timestamp,
};
use crate::error::{RndError, Result};
use crate::estimation::{EstimationConfig, Estimator, EstimatorKind};
use crate::models::fx::{build_strike_vol_frames, SmileBuilder};

/// Materialised batch: one smile input per qualifying timestamp plus the
/// timestamps that already failed upstream of estimation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchInput {
    pub smiles: Vec<SmileInput>,
    pub failed: Vec<(Timestamp, EstimationFailure)>,
}

impl BatchInput {
    /// Joins strike/vol, forward and rates frames. Timestamps with fewer than
    /// five strike/vol rows are dropped.
    pub fn from_frames(
        strike_vol: &[StrikeVolRow],
        forwards: &[ForwardRow],
        rates: &[RatesRow],
    ) -> Self {
        Self {
            smiles: join_frames(strike_vol, forwards, rates),
            failed: Vec::new(),
        }
    }

    /// Builds the frames from a quote table with the configured conventions.
    ///
    /// An instrument missing from the whole table is a schema error; a
    /// timestamp whose strikes cannot be solved is carried as a failure.
    pub fn from_quotes(table: &QuoteTable, config: &EstimationConfig) -> Result<Self> {
        let set = build_snapshots(table)?;
        let builder = SmileBuilder::new(config.conventions, config.maturity);
        let frames = build_strike_vol_frames(&set.snapshots, &builder);
        let mut input = Self::from_frames(&frames.strike_vol, &frames.forwards, &frames.rates);
        input.failed = frames
            .failures
            .iter()
            .map(|(ts, e)| (*ts, EstimationFailure::from(e)))
            .collect();
        info!(
            timestamps = table.timestamps().len(),
            smiles = input.smiles.len(),
            excluded = set.excluded.len(),
            failed = input.failed.len(),
            "prepared batch from quote table"
        );
        Ok(input)
    }

    pub fn timestamps(&self) -> Vec<Timestamp> {
        let mut ts: Vec<Timestamp> = self
            .smiles
            .iter()
            .map(|s| s.timestamp)
            .chain(self.failed.iter().map(|(t, _)| *t))
            .collect();
        ts.sort();
        ts
    }
}

fn open_cache(options: &BatchOptions) -> Result<Option<DiskCache>> {
    options.cache_dir.as_ref().map(DiskCache::new).transpose()
}

fn memoised<T, A, F>(options: &BatchOptions, function: &str, args: &A, compute: F) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
    A: Serialize,
    F: FnOnce() -> Result<T>,
{
    match open_cache(options)? {
        Some(cache) => {
            let key = CacheKey::new(function, args)?;
            cache.get_or_compute(&key, compute)
        }
        None => compute(),
    }
}

fn cell_from(outcome: Result<f64>) -> Cell {
    outcome.map_err(|e| EstimationFailure::from(&e))
}

fn log_failures(label: &str, rows: &[TableRow]) {
    for row in rows {
        for cell in &row.cells {
            if let Err(f) = cell {
                warn!(
                    label,
                    timestamp = %row.timestamp,
                    kind = ?f.kind,
                    reason = %f.message,
                    "estimation failed"
                );
            }
        }
    }
}

/// Per-timestamp probability rows for `thresholds`, sorted by timestamp.
fn probability_rows(
    estimator: &Estimator,
    input: &BatchInput,
    thresholds: &[f64],
    options: &BatchOptions,
) -> Result<Vec<TableRow>> {
    let tasks: Vec<_> = input
        .smiles
        .iter()
        .map(|smile| {
            let task = move || estimator.probabilities(smile, thresholds);
            (smile.timestamp, task)
        })
        .collect();

    let outcomes: Vec<(Timestamp, TaskOutcome<Vec<Result<f64>>>)> =
        TaskScheduler::new(options.execution())
            .with_label("probability")
            .run(tasks)?;

    let mut rows: Vec<TableRow> = outcomes
        .into_iter()
        .map(|(timestamp, outcome)| {
            let cells = match outcome {
                Ok(cells) => cells.into_iter().map(cell_from).collect(),
                Err(failure) => {
                    let failure = EstimationFailure::from(failure);
                    vec![Err(failure); thresholds.len()]
                }
            };
            TableRow { timestamp, cells }
        })
        .collect();
    rows.extend(input.failed.iter().map(|(timestamp, failure)| TableRow {
        timestamp: *timestamp,
        cells: vec![Err(failure.clone()); thresholds.len()],
    }));
    rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    log_failures("probability", &rows);
    Ok(rows)
}

fn require_probability(kind: EstimatorKind) -> Result<()> {
    if kind.is_probability() {
        Ok(())
    } else {
        Err(RndError::Config {
            message: format!("'{kind}' is not a probability estimator"),
        })
    }
}

/// `P[S_T > config.threshold]` per timestamp.
///
/// `kind` picks the model-free density or the parametric mixture. The result
/// is memoised on the input, kind and config; `options` only decide how the
/// work is executed.
pub fn estimate_probability(
    input: &BatchInput,
    kind: EstimatorKind,
    config: &EstimationConfig,
    options: &BatchOptions,
) -> Result<EstimateSeries> {
    require_probability(kind)?;
    let estimator = Estimator::new(kind, config.clone())?;
    let threshold = config.threshold;
    memoised(
        options,
        "estimate_probability",
        &(kind, input, &config.cache_identity()),
        || {
            info!(
                kind = %kind,
                timestamps = input.smiles.len(),
                threshold,
                "estimating probabilities"
            );
            let rows = probability_rows(&estimator, input, &[threshold], options)?;
            let entries = rows
                .into_iter()
                .map(|mut row| SeriesEntry {
                    timestamp: row.timestamp,
                    value: row.cells.pop().unwrap_or_else(|| {
                        Err(EstimationFailure::from(&RndError::integration("empty row")))
                    }),
                })
                .collect();
            let series = EstimateSeries::new(format!("p_{threshold}"), entries);
            info!(
                ok = series.values().len(),
                failed = series.failures().len(),
                "probability batch done"
            );
            Ok(series)
        },
    )
}

/// Probability table over several thresholds, columns in the given order.
///
/// `thresholds` defaults to `config.multi_level_thresholds` (85 to 135 by 10).
pub fn estimate_probability_multiple_levels(
    input: &BatchInput,
    kind: EstimatorKind,
    thresholds: Option<&[f64]>,
    config: &EstimationConfig,
    options: &BatchOptions,
) -> Result<EstimateTable> {
    require_probability(kind)?;
    let thresholds: Vec<f64> = thresholds
        .map(|t| t.to_vec())
        .unwrap_or_else(|| config.multi_level_thresholds.clone());
    config.check_thresholds(&thresholds)?;
    let estimator = Estimator::new(kind, config.clone())?;
    memoised(
        options,
        "estimate_probability_multiple_levels",
        &(kind, &thresholds, input, &config.cache_identity()),
        || {
            info!(
                kind = %kind,
                timestamps = input.smiles.len(),
                levels = thresholds.len(),
                "estimating probability table"
            );
            let rows = probability_rows(&estimator, input, &thresholds, options)?;
            EstimateTable::new(thresholds.clone(), rows)
        },
    )
}

/// Model-free implied variance per timestamp (SVIX unless configured off).
pub fn estimate_mfiv(
    input: &BatchInput,
    config: &EstimationConfig,
    options: &BatchOptions,
) -> Result<EstimateSeries> {
    let estimator = Estimator::new(EstimatorKind::ModelFreeVariance, config.clone())?;
    let key_config = config.cache_identity();
    memoised(options, "estimate_mfiv", &(input, &key_config), || {
        info!(
            timestamps = input.smiles.len(),
            svix = config.variance.svix,
            "estimating model-free variance"
        );
        let tasks: Vec<_> = input
            .smiles
            .iter()
            .map(|smile| {
                let estimator = &estimator;
                (smile.timestamp, move || estimator.variance(smile))
            })
            .collect();
        let outcomes = TaskScheduler::new(options.execution())
            .with_label("mfiv")
            .run(tasks)?;

        let mut entries: Vec<SeriesEntry> = outcomes
            .into_iter()
            .map(|(timestamp, outcome)| SeriesEntry {
                timestamp,
                value: outcome.map_err(EstimationFailure::from),
            })
            .collect();
        entries.extend(input.failed.iter().map(|(timestamp, failure)| SeriesEntry {
            timestamp: *timestamp,
            value: Err(failure.clone()),
        }));
        for (ts, f) in entries
            .iter()
            .filter_map(|e| e.value.as_ref().err().map(|f| (e.timestamp, f)))
        {
            warn!(
                label = "mfiv",
                timestamp = %ts,
                kind = ?f.kind,
                reason = %f.message,
                "estimation failed"
            );
        }
        let name = if config.variance.svix { "svix" } else { "mfiv" };
        Ok(EstimateSeries::new(name, entries))
    })
}
