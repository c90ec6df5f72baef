use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    atm_strike, decompose_vanillas, strike_from_delta, FxConventions, FxMarket, SolverSettings,
};
use crate::data::{
    ForwardRow, MarketSnapshot, RatesRow, SmileInput, StrikeVol, StrikeVolRow, Timestamp,
};
use crate::error::{RndError, Result};

/// One vanilla on the smile: signed delta (zero for ATM), strike and vol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaStrike {
    pub delta: f64,
    pub strike: f64,
    pub vol: f64,
}

/// Turns the five quoted vols of a snapshot into five (strike, vol) points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmileBuilder {
    pub conventions: FxConventions,
    pub tau: f64,
    pub solver: SolverSettings,
}

impl SmileBuilder {
    pub fn new(conventions: FxConventions, tau: f64) -> Self {
        Self {
            conventions,
            tau,
            solver: SolverSettings::default(),
        }
    }

    pub fn with_solver(mut self, solver: SolverSettings) -> Self {
        self.solver = solver;
        self
    }

    /// The five pillars ordered by strike: 10d put, 25d put, ATM, 25d call,
    /// 10d call. The ATM vol is the quoted one, untouched.
    pub fn build(&self, snap: &MarketSnapshot) -> Result<[DeltaStrike; 5]> {
        let market = FxMarket {
            spot: snap.spot,
            forward: snap.forward,
            r_base: snap.r_base,
            tau: self.tau,
        };
        let wing25 = decompose_vanillas(snap.v_atm, snap.v_25r, snap.v_25b);
        let wing10 = decompose_vanillas(snap.v_atm, snap.v_10r, snap.v_10b);

        let leg = |delta: f64, vol: f64| -> Result<DeltaStrike> {
            let strike = strike_from_delta(
                &market,
                delta,
                vol,
                delta > 0.0,
                &self.conventions,
                &self.solver,
            )?;
            Ok(DeltaStrike { delta, strike, vol })
        };

        let points = [
            leg(-0.10, wing10.put)?,
            leg(-0.25, wing25.put)?,
            DeltaStrike {
                delta: 0.0,
                strike: atm_strike(&market, snap.v_atm, &self.conventions),
                vol: snap.v_atm,
            },
            leg(0.25, wing25.call)?,
            leg(0.10, wing10.call)?,
        ];

        if points.windows(2).any(|w| w[0].strike >= w[1].strike) {
            return Err(RndError::conversion(format!(
                "strikes not increasing across pillars at {}: {:?}",
                snap.timestamp,
                points.iter().map(|p| p.strike).collect::<Vec<_>>()
            )));
        }
        Ok(points)
    }

    /// [`build`](Self::build) packaged with the forward and rates.
    pub fn smile_input(&self, snap: &MarketSnapshot) -> Result<SmileInput> {
        let points = self.build(snap)?;
        Ok(SmileInput {
            timestamp: snap.timestamp,
            forward: snap.forward,
            r_counter: snap.r_counter,
            r_base: snap.r_base,
            points: points
                .iter()
                .map(|p| StrikeVol {
                    strike: p.strike,
                    vol: p.vol,
                })
                .collect(),
        })
    }
}

/// Strike/vol, forward and rates frames for a set of snapshots, plus the
/// timestamps whose conversion failed.
#[derive(Debug, Default)]
pub struct StrikeVolFrames {
    pub strike_vol: Vec<StrikeVolRow>,
    pub forwards: Vec<ForwardRow>,
    pub rates: Vec<RatesRow>,
    pub failures: Vec<(Timestamp, RndError)>,
}

/// Runs the builder over every snapshot and lays the result out as the
/// long-form frames [`crate::data::join_frames`] consumes.
pub fn build_strike_vol_frames(
    snapshots: &[MarketSnapshot],
    builder: &SmileBuilder,
) -> StrikeVolFrames {
    let mut frames = StrikeVolFrames::default();
    for snap in snapshots {
        match builder.build(snap) {
            Ok(points) => {
                frames
                    .strike_vol
                    .extend(points.iter().map(|p| StrikeVolRow {
                        timestamp: snap.timestamp,
                        strike: p.strike,
                        vol: p.vol,
                    }));
                frames.forwards.push(ForwardRow {
                    timestamp: snap.timestamp,
                    forward: snap.forward,
                });
                frames.rates.push(RatesRow {
                    timestamp: snap.timestamp,
                    r_counter: snap.r_counter,
                    r_base: snap.r_base,
                });
            }
            Err(e) => {
                warn!(timestamp = %snap.timestamp, error = %e, "strike conversion failed");
                frames.failures.push((snap.timestamp, e));
            }
        }
    }
    debug!(
        rows = frames.strike_vol.len(),
        failures = frames.failures.len(),
        "built strike/vol frames"
    );
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_timestamp;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            timestamp: parse_timestamp("2022-02-28 16:44:00+01:00").unwrap(),
            spot: 109.3052,
            forward: 112.4394,
            r_base: 0.002354,
            r_counter: 0.346508,
            v_atm: 0.854825,
            v_25r: 0.2132,
            v_10r: 0.4603,
            v_25b: 0.03775,
            v_10b: 0.146675,
        }
    }

    #[test]
    fn five_increasing_positive_strikes_with_exact_atm_vol() {
        let builder = SmileBuilder::new(FxConventions::default(), 1.0 / 12.0);
        let snap = snapshot();
        let points = builder.build(&snap).unwrap();
        assert!(points.iter().all(|p| p.strike > 0.0));
        assert!(points.windows(2).all(|w| w[0].strike < w[1].strike));
        assert_eq!(points[2].vol, snap.v_atm);
        assert!(points[0].strike < snap.forward && points[4].strike > snap.forward);
    }

    #[test]
    fn frames_join_back_to_one_input_per_snapshot() {
        let builder = SmileBuilder::new(FxConventions::default(), 1.0 / 12.0);
        let mut second = snapshot();
        second.timestamp = parse_timestamp("2022-02-28 16:45:00+01:00").unwrap();
        let frames = build_strike_vol_frames(&[snapshot(), second], &builder);
        assert_eq!(frames.strike_vol.len(), 10);
        assert!(frames.failures.is_empty());

        let inputs = crate::data::join_frames(&frames.strike_vol, &frames.forwards, &frames.rates);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], builder.smile_input(&snapshot()).unwrap());
    }

    #[test]
    fn solver_budget_controls_premium_adjusted_inversion() {
        let snap = snapshot();
        let exact = SmileBuilder::new(FxConventions::default(), 1.0 / 12.0)
            .build(&snap)
            .unwrap();
        let loose = SmileBuilder::new(FxConventions::default(), 1.0 / 12.0)
            .with_solver(SolverSettings {
                tolerance: 1e-7,
                max_iterations: 200,
            })
            .build(&snap)
            .unwrap();
        for (a, b) in exact.iter().zip(&loose) {
            assert!((a.strike - b.strike).abs() < 1e-2);
        }

        let starved = SmileBuilder::new(FxConventions::default(), 1.0 / 12.0).with_solver(
            SolverSettings {
                tolerance: 1e-12,
                max_iterations: 1,
            },
        );
        let err = starved.build(&snap).unwrap_err();
        assert!(matches!(err, RndError::Conversion { .. }));
    }

    #[test]
    fn failing_snapshot_is_recorded_not_fatal() {
        let builder = SmileBuilder::new(FxConventions::default(), 1.0 / 12.0);
        let mut bad = snapshot();
        bad.v_10r = 5.0; // put vol goes negative
        let frames = build_strike_vol_frames(&[snapshot(), bad], &builder);
        assert_eq!(frames.forwards.len(), 1);
        assert_eq!(frames.failures.len(), 1);
    }
}
