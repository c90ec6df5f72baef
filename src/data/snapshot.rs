//! Per-timestamp market snapshots pivoted out of a [`QuoteTable`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::quotes::{Instrument, QuoteTable, Timestamp};
use crate::error::{RndError, Result};

/// Minimum number of distinct volatility quotes for a timestamp to be used.
pub const MIN_VOL_QUOTES: usize = 5;

/// Spot, forward, rates and the five vol quotes observed at one timestamp.
///
/// Rates and vols are fractions of 1 per annum. `r_base` is the rate of the
/// base currency (USD in USDRUB), `r_counter` that of the counter currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: Timestamp,
    pub spot: f64,
    pub forward: f64,
    pub r_base: f64,
    pub r_counter: f64,
    pub v_atm: f64,
    pub v_25r: f64,
    pub v_10r: f64,
    pub v_25b: f64,
    pub v_10b: f64,
}

/// Why a timestamp did not make it into the snapshot set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub timestamp: Timestamp,
    pub reason: String,
}

/// Snapshots ready for estimation plus the timestamps that were dropped.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    pub snapshots: Vec<MarketSnapshot>,
    pub excluded: Vec<Exclusion>,
}

/// Fails when an instrument is absent from the whole table: no timestamp
/// could be estimated, so the batch must not start.
pub fn check_schema(table: &QuoteTable) -> Result<()> {
    let present = table.instruments();
    let missing: Vec<&str> = Instrument::ALL
        .iter()
        .filter(|i| !present.contains(i))
        .map(|i| i.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(RndError::Schema {
            message: format!("instruments missing from quote table: {}", missing.join(", ")),
        });
    }
    Ok(())
}

/// Pivots the table into one snapshot per timestamp.
///
/// Timestamps with fewer than [`MIN_VOL_QUOTES`] vol quotes, or missing spot,
/// forward or either rate, are excluded rather than reported as failures.
pub fn build_snapshots(table: &QuoteTable) -> Result<SnapshotSet> {
    check_schema(table)?;

    let counts = table.vol_quote_counts();
    let mut set = SnapshotSet::default();
    for ts in table.timestamps() {
        let n_vols = counts.get(&ts).copied().unwrap_or(0);
        if n_vols < MIN_VOL_QUOTES {
            set.excluded.push(Exclusion {
                timestamp: ts,
                reason: format!("{n_vols} volatility quotes, need {MIN_VOL_QUOTES}"),
            });
            continue;
        }
        let get = |i: Instrument| table.get(&ts, i);
        let snapshot = (|| {
            Some(MarketSnapshot {
                timestamp: ts,
                spot: get(Instrument::Spot)?,
                forward: get(Instrument::Forward)?,
                r_base: get(Instrument::RBase)?,
                r_counter: get(Instrument::RCounter)?,
                v_atm: get(Instrument::VAtm)?,
                v_25r: get(Instrument::V25r)?,
                v_10r: get(Instrument::V10r)?,
                v_25b: get(Instrument::V25b)?,
                v_10b: get(Instrument::V10b)?,
            })
        })();
        match snapshot {
            Some(s) => set.snapshots.push(s),
            None => set.excluded.push(Exclusion {
                timestamp: ts,
                reason: "spot, forward or rates missing".to_string(),
            }),
        }
    }
    debug!(
        kept = set.snapshots.len(),
        excluded = set.excluded.len(),
        "built market snapshots"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::quotes::parse_timestamp;

    fn full_table(ts: &[&str]) -> QuoteTable {
        let mut table = QuoteTable::new();
        for t in ts {
            let t = parse_timestamp(t).unwrap();
            for (i, v) in [
                (Instrument::Spot, 109.3052),
                (Instrument::Forward, 112.4394),
                (Instrument::RBase, 0.002354),
                (Instrument::RCounter, 0.346508),
                (Instrument::VAtm, 0.854825),
                (Instrument::V25r, 0.2132),
                (Instrument::V10r, 0.4603),
                (Instrument::V25b, 0.03775),
                (Instrument::V10b, 0.146675),
            ] {
                table.insert(t, i, v).unwrap();
            }
        }
        table
    }

    #[test]
    fn builds_one_snapshot_per_complete_timestamp() {
        let table = full_table(&["2022-02-28 16:44:00+01:00", "2022-02-28 16:45:00+01:00"]);
        let set = build_snapshots(&table).unwrap();
        assert_eq!(set.snapshots.len(), 2);
        assert!(set.excluded.is_empty());
        assert!(set.snapshots[0].timestamp < set.snapshots[1].timestamp);
        assert_eq!(set.snapshots[0].v_10b, 0.146675);
    }

    #[test]
    fn drops_timestamps_with_too_few_vol_quotes() {
        let mut table = full_table(&["2022-02-28 16:44:00+01:00"]);
        let thin = parse_timestamp("2022-02-28 16:50:00+01:00").unwrap();
        table.insert(thin, Instrument::Spot, 110.0).unwrap();
        table.insert(thin, Instrument::VAtm, 0.8).unwrap();
        table.insert(thin, Instrument::V25r, 0.2).unwrap();

        let set = build_snapshots(&table).unwrap();
        assert_eq!(set.snapshots.len(), 1);
        assert_eq!(set.excluded.len(), 1);
        assert_eq!(set.excluded[0].timestamp, thin);
    }

    #[test]
    fn missing_instrument_is_a_schema_error() {
        let mut table = QuoteTable::new();
        let t = parse_timestamp("2022-02-28 16:44:00+01:00").unwrap();
        for i in Instrument::VOLS {
            table.insert(t, i, 0.1).unwrap();
        }
        let err = build_snapshots(&table).unwrap_err();
        assert!(err.is_systemic());
        assert!(format!("{err}").contains("spot"));
    }
}
