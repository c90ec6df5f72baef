//! Long-form quote table: `(timestamp, instrument) -> value`.
//!
//! Rates and volatilities in a processed table are fractions of 1 per annum.
//! Raw tables (as delivered by data vendors, in percent) are turned into
//! processed ones by [`normalize_raw_quotes`], which also implies the
//! counter-currency rate from forward-spot parity.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RndError, Result};

/// Timezone-aware observation time.
pub type Timestamp = DateTime<FixedOffset>;

/// Parses `2022-02-28 16:44:00+01:00` style timestamps as well as RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z"))
        .map_err(|e| RndError::invalid(format!("unparseable timestamp '{raw}': {e}")))
}

/// The fixed set of instruments a quote can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Spot,
    Forward,
    RBase,
    RCounter,
    VAtm,
    V25r,
    V10r,
    V25b,
    V10b,
}

impl Instrument {
    pub const ALL: [Instrument; 9] = [
        Instrument::Spot,
        Instrument::Forward,
        Instrument::RBase,
        Instrument::RCounter,
        Instrument::VAtm,
        Instrument::V25r,
        Instrument::V10r,
        Instrument::V25b,
        Instrument::V10b,
    ];

    /// The five volatility quotes that pin down a smile.
    pub const VOLS: [Instrument; 5] = [
        Instrument::VAtm,
        Instrument::V25r,
        Instrument::V10r,
        Instrument::V25b,
        Instrument::V10b,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Instrument::Spot => "spot",
            Instrument::Forward => "forward",
            Instrument::RBase => "r_base",
            Instrument::RCounter => "r_counter",
            Instrument::VAtm => "v_atm",
            Instrument::V25r => "v_25r",
            Instrument::V10r => "v_10r",
            Instrument::V25b => "v_25b",
            Instrument::V10b => "v_10b",
        }
    }

    pub fn is_vol(self) -> bool {
        Self::VOLS.contains(&self)
    }

    /// Quoted in percent in raw vendor data.
    fn is_percent_quoted(self) -> bool {
        self.is_vol() || matches!(self, Instrument::RBase | Instrument::RCounter)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Instrument {
    type Err = RndError;

    fn from_str(s: &str) -> Result<Self> {
        Instrument::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s.trim())
            .ok_or_else(|| RndError::invalid(format!("unknown instrument '{s}'")))
    }
}

/// One observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: Timestamp,
    pub instrument: Instrument,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
struct CsvQuoteRow {
    date: String,
    name: String,
    value: Option<f64>,
}

/// Canonical long-form mapping `(timestamp, instrument) -> value`, ordered by
/// timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteTable {
    values: BTreeMap<(Timestamp, Instrument), f64>,
}

impl QuoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a quote. Re-inserting an identical value is a no-op; a
    /// conflicting value for the same `(timestamp, instrument)` is rejected.
    pub fn insert(&mut self, timestamp: Timestamp, instrument: Instrument, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(RndError::invalid(format!(
                "{instrument} at {timestamp}: value must be finite, got {value}"
            )));
        }
        match self.values.get(&(timestamp, instrument)) {
            Some(existing) if *existing != value => Err(RndError::invalid(format!(
                "conflicting {instrument} quotes at {timestamp}: {existing} vs {value}"
            ))),
            Some(_) => Ok(()),
            None => {
                self.values.insert((timestamp, instrument), value);
                Ok(())
            }
        }
    }

    pub fn from_quotes(quotes: impl IntoIterator<Item = Quote>) -> Result<Self> {
        let mut table = Self::new();
        for q in quotes {
            table.insert(q.timestamp, q.instrument, q.value)?;
        }
        Ok(table)
    }

    /// Reads a long-form CSV with `date,name,value` columns.
    ///
    /// Rows with an empty value are dropped; rows naming an instrument outside
    /// the fixed set are skipped and counted.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut table = Self::new();
        let mut skipped = 0usize;
        for row in rdr.deserialize() {
            let row: CsvQuoteRow = row?;
            let Some(value) = row.value else {
                continue;
            };
            let instrument = match row.name.parse::<Instrument>() {
                Ok(i) => i,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            table.insert(parse_timestamp(&row.date)?, instrument, value)?;
        }
        if skipped > 0 {
            debug!(skipped, "skipped rows with unknown instrument names");
        }
        Ok(table)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Writes the table back out in the same long form it is read from.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["date", "name", "value"])?;
        for q in self.iter() {
            wtr.write_record([
                q.timestamp.format("%Y-%m-%d %H:%M:%S%:z").to_string(),
                q.instrument.as_str().to_string(),
                q.value.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn get(&self, timestamp: &Timestamp, instrument: Instrument) -> Option<f64> {
        self.values.get(&(*timestamp, instrument)).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Quote> + '_ {
        self.values.iter().map(|(&(timestamp, instrument), &value)| Quote {
            timestamp,
            instrument,
            value,
        })
    }

    /// Distinct timestamps in ascending order.
    pub fn timestamps(&self) -> Vec<Timestamp> {
        let set: BTreeSet<Timestamp> = self.values.keys().map(|(ts, _)| *ts).collect();
        set.into_iter().collect()
    }

    /// Instruments present anywhere in the table.
    pub fn instruments(&self) -> BTreeSet<Instrument> {
        self.values.keys().map(|(_, i)| *i).collect()
    }

    /// Number of distinct volatility quotes per timestamp.
    pub fn vol_quote_counts(&self) -> BTreeMap<Timestamp, usize> {
        let mut counts = BTreeMap::new();
        for (ts, instrument) in self.values.keys() {
            if instrument.is_vol() {
                *counts.entry(*ts).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Time series of one instrument, ordered by timestamp.
    pub fn series(&self, instrument: Instrument) -> Vec<(Timestamp, f64)> {
        self.values
            .iter()
            .filter(|((_, i), _)| *i == instrument)
            .map(|((ts, _), v)| (*ts, *v))
            .collect()
    }
}

/// Counter-currency rate implied by forward-spot parity,
/// `f = s * (1 + r_counter / n) / (1 + r_base / n)`, solved for `r_counter`.
///
/// `r_base` is a fraction of 1 per annum; `rates_ann_factor` (`n`) de-annualises
/// it over the life of the forward, e.g. 12 for a one-month forward.
pub fn implied_counter_rate(spot: f64, forward: f64, r_base: f64, rates_ann_factor: f64) -> Result<f64> {
    crate::error::validate_positive(spot, "spot")?;
    crate::error::validate_positive(forward, "forward")?;
    crate::error::validate_positive(rates_ann_factor, "rates_ann_factor")?;
    crate::error::validate_finite(r_base, "r_base")?;
    Ok((forward / spot * (1.0 + r_base / rates_ann_factor) - 1.0) * rates_ann_factor)
}

/// Turns a raw vendor table (vols and base rate in percent) into a processed
/// table: fractions of 1 per annum plus a forward-implied `r_counter`.
///
/// Any `r_counter` already present in the raw table is replaced.
pub fn normalize_raw_quotes(raw: &QuoteTable, rates_ann_factor: f64) -> Result<QuoteTable> {
    crate::error::validate_positive(rates_ann_factor, "rates_ann_factor")?;
    let mut out = QuoteTable::new();
    for q in raw.iter() {
        if q.instrument == Instrument::RCounter {
            continue;
        }
        let value = if q.instrument.is_percent_quoted() {
            q.value / 100.0
        } else {
            q.value
        };
        out.insert(q.timestamp, q.instrument, value)?;
    }

    let mut missing_legs = 0usize;
    for ts in raw.timestamps() {
        let legs = (
            out.get(&ts, Instrument::Spot),
            out.get(&ts, Instrument::Forward),
            out.get(&ts, Instrument::RBase),
        );
        match legs {
            (Some(spot), Some(forward), Some(r_base)) => {
                let r_counter = implied_counter_rate(spot, forward, r_base, rates_ann_factor)?;
                out.insert(ts, Instrument::RCounter, r_counter)?;
            }
            _ => missing_legs += 1,
        }
    }
    if missing_legs > 0 {
        warn!(
            missing_legs,
            "timestamps without spot/forward/r_base; no counter rate implied"
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn parses_space_and_rfc3339_timestamps() {
        let a = ts("2022-02-28 16:44:00+01:00");
        let b = ts("2022-02-28T16:44:00+01:00");
        assert_eq!(a, b);
        assert!(parse_timestamp("28/02/2022").is_err());
    }

    #[test]
    fn instrument_names_round_trip() {
        for i in Instrument::ALL {
            assert_eq!(i.as_str().parse::<Instrument>().unwrap(), i);
        }
        assert!("v_15b".parse::<Instrument>().is_err());
    }

    #[test]
    fn rejects_conflicting_duplicates() {
        let mut table = QuoteTable::new();
        let t = ts("2022-02-28 16:44:00+01:00");
        table.insert(t, Instrument::Spot, 109.3).unwrap();
        table.insert(t, Instrument::Spot, 109.3).unwrap();
        assert!(table.insert(t, Instrument::Spot, 109.4).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn counter_rate_matches_documented_sample() {
        let r = implied_counter_rate(109.3052, 112.4394, 0.002354, 12.0).unwrap();
        assert_relative_eq!(r, 0.346508, epsilon = 1e-6);

        let rounded = implied_counter_rate(109.31, 112.44, 0.0024, 12.0).unwrap();
        let expected = ((112.44 / 109.31) * (1.0 + 0.0024 / 12.0) - 1.0) * 12.0;
        assert_relative_eq!(rounded, expected, epsilon = 1e-15);
    }

    #[test]
    fn normalizes_percent_quotes_and_implies_counter_rate() {
        let csv = "date,name,value\n\
            2022-02-28 16:44:00+01:00,spot,109.3052\n\
            2022-02-28 16:44:00+01:00,r_base,0.2354\n\
            2022-02-28 16:44:00+01:00,v_atm,85.4825\n\
            2022-02-28 16:44:00+01:00,v_25r,21.32\n\
            2022-02-28 16:44:00+01:00,v_15r,30.0\n\
            2022-02-28 16:44:00+01:00,forward,112.4394\n";
        let raw = QuoteTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(raw.len(), 5);

        let processed = normalize_raw_quotes(&raw, 12.0).unwrap();
        let t = ts("2022-02-28 16:44:00+01:00");
        assert_relative_eq!(processed.get(&t, Instrument::VAtm).unwrap(), 0.854825, epsilon = 1e-12);
        assert_relative_eq!(processed.get(&t, Instrument::Spot).unwrap(), 109.3052);
        assert_relative_eq!(
            processed.get(&t, Instrument::RCounter).unwrap(),
            0.346508,
            epsilon = 1e-6
        );
    }

    #[test]
    fn csv_round_trips_through_writer() {
        let mut table = QuoteTable::new();
        let t = ts("2022-02-24 09:30:00+01:00");
        table.insert(t, Instrument::Forward, 88.5).unwrap();
        table.insert(t, Instrument::V10b, 0.05).unwrap();

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let back = QuoteTable::from_csv_reader(buf.as_slice()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn counts_vol_quotes_per_timestamp() {
        let mut table = QuoteTable::new();
        let t1 = ts("2022-02-24 09:30:00+01:00");
        let t2 = ts("2022-02-24 09:31:00+01:00");
        for i in Instrument::VOLS {
            table.insert(t1, i, 0.2).unwrap();
        }
        table.insert(t2, Instrument::VAtm, 0.2).unwrap();
        table.insert(t2, Instrument::Spot, 80.0).unwrap();

        let counts = table.vol_quote_counts();
        assert_eq!(counts[&t1], 5);
        assert_eq!(counts[&t2], 1);
        assert_eq!(table.timestamps(), vec![t1, t2]);
    }
}
