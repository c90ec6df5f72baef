//! Strike/vol, forward and rates frames, and their join into per-timestamp
//! smile inputs.
//!
//! The join mirrors a relational inner join on the timestamp: repeated
//! forward or rates rows multiply the strike rows, so duplicates are folded
//! back when grouping (identical strikes are averaged, the first forward and
//! rates row wins).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::quotes::Timestamp;
use super::snapshot::MIN_VOL_QUOTES;

/// A point on a smile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeVol {
    pub strike: f64,
    /// Black implied volatility, fraction of 1 per annum.
    pub vol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeVolRow {
    pub timestamp: Timestamp,
    pub strike: f64,
    pub vol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardRow {
    pub timestamp: Timestamp,
    pub forward: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatesRow {
    pub timestamp: Timestamp,
    /// Counter-currency (pricing currency) rate.
    pub r_counter: f64,
    /// Base-currency rate, the "dividend yield" of the exchange rate.
    pub r_base: f64,
}

/// Everything one estimation task needs: the smile points for a timestamp
/// plus the forward and both rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmileInput {
    pub timestamp: Timestamp,
    pub forward: f64,
    pub r_counter: f64,
    pub r_base: f64,
    /// Sorted by strike, strikes unique.
    pub points: Vec<StrikeVol>,
}

impl SmileInput {
    pub fn strikes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.strike).collect()
    }

    pub fn vols(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.vol).collect()
    }
}

/// Sorts points by strike and averages the vols of duplicated strikes.
///
/// Strikes are keyed at 8 decimals so that rows duplicated by a join collapse
/// onto one point.
pub fn dedupe_points(points: &[StrikeVol]) -> Vec<StrikeVol> {
    let mut by_strike: HashMap<i64, (f64, Vec<f64>)> = HashMap::new();
    for p in points {
        if !p.strike.is_finite() || !p.vol.is_finite() {
            continue;
        }
        let key = (p.strike * 1e8).round() as i64;
        by_strike
            .entry(key)
            .or_insert_with(|| (p.strike, Vec::new()))
            .1
            .push(p.vol);
    }
    let mut out: Vec<StrikeVol> = by_strike
        .into_values()
        .map(|(strike, vols)| StrikeVol {
            strike,
            vol: vols.iter().sum::<f64>() / vols.len() as f64,
        })
        .collect();
    out.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    out
}

/// Inner-joins the three frames on timestamp and groups by timestamp.
///
/// Timestamps with fewer than [`MIN_VOL_QUOTES`] strike/vol rows are dropped
/// before the join; the output is ordered by timestamp.
pub fn join_frames(
    strike_vol: &[StrikeVolRow],
    forwards: &[ForwardRow],
    rates: &[RatesRow],
) -> Vec<SmileInput> {
    let mut points: BTreeMap<Timestamp, Vec<StrikeVol>> = BTreeMap::new();
    for row in strike_vol {
        points.entry(row.timestamp).or_default().push(StrikeVol {
            strike: row.strike,
            vol: row.vol,
        });
    }
    let before = points.len();
    points.retain(|_, pts| pts.len() >= MIN_VOL_QUOTES);

    let mut forward_by_ts: HashMap<Timestamp, Vec<f64>> = HashMap::new();
    for row in forwards {
        forward_by_ts.entry(row.timestamp).or_default().push(row.forward);
    }
    let mut rates_by_ts: HashMap<Timestamp, Vec<(f64, f64)>> = HashMap::new();
    for row in rates {
        rates_by_ts
            .entry(row.timestamp)
            .or_default()
            .push((row.r_counter, row.r_base));
    }

    let mut out = Vec::with_capacity(points.len());
    for (ts, pts) in points {
        let (Some(fwds), Some(rts)) = (forward_by_ts.get(&ts), rates_by_ts.get(&ts)) else {
            continue;
        };
        // many-to-many: every strike row pairs with every forward and rates row
        let joined: Vec<StrikeVol> = pts
            .iter()
            .flat_map(|p| std::iter::repeat(*p).take(fwds.len() * rts.len()))
            .collect();
        let (r_counter, r_base) = rts[0];
        out.push(SmileInput {
            timestamp: ts,
            forward: fwds[0],
            r_counter,
            r_base,
            points: dedupe_points(&joined),
        });
    }
    debug!(
        timestamps = before,
        joined = out.len(),
        "joined strike/vol, forward and rates frames"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::quotes::parse_timestamp;

    fn t(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn rows(ts: Timestamp, n: usize) -> Vec<StrikeVolRow> {
        (0..n)
            .map(|i| StrikeVolRow {
                timestamp: ts,
                strike: 90.0 + 5.0 * i as f64,
                vol: 0.2 + 0.01 * i as f64,
            })
            .collect()
    }

    #[test]
    fn dedupe_averages_identical_strikes() {
        let pts = vec![
            StrikeVol { strike: 100.0, vol: 0.2 },
            StrikeVol { strike: 95.0, vol: 0.25 },
            StrikeVol { strike: 100.0, vol: 0.3 },
        ];
        let out = dedupe_points(&pts);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].strike, 95.0);
        assert!((out[1].vol - 0.25).abs() < 1e-12);
    }

    #[test]
    fn join_filters_thin_timestamps_and_tolerates_duplicates() {
        let t1 = t("2022-02-24 10:00:00+01:00");
        let t2 = t("2022-02-24 10:01:00+01:00");
        let t3 = t("2022-02-24 10:02:00+01:00");

        let mut sv = rows(t1, 5);
        sv.extend(rows(t2, 4));
        sv.extend(rows(t3, 5));

        let forwards = vec![
            ForwardRow { timestamp: t1, forward: 100.0 },
            ForwardRow { timestamp: t1, forward: 100.0 },
            ForwardRow { timestamp: t2, forward: 101.0 },
            ForwardRow { timestamp: t3, forward: 102.0 },
        ];
        let rates = vec![
            RatesRow { timestamp: t1, r_counter: 0.1, r_base: 0.002 },
            RatesRow { timestamp: t2, r_counter: 0.1, r_base: 0.002 },
            RatesRow { timestamp: t3, r_counter: 0.2, r_base: 0.003 },
        ];

        let joined = join_frames(&sv, &forwards, &rates);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].timestamp, t1);
        assert_eq!(joined[0].points.len(), 5);
        assert_eq!(joined[1].timestamp, t3);
        assert_eq!(joined[1].r_counter, 0.2);
    }

    #[test]
    fn join_drops_timestamps_without_forward() {
        let t1 = t("2022-02-24 10:00:00+01:00");
        let joined = join_frames(
            &rows(t1, 5),
            &[],
            &[RatesRow { timestamp: t1, r_counter: 0.1, r_base: 0.0 }],
        );
        assert!(joined.is_empty());
    }
}
