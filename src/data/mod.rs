//! Market data: the long-form quote table, per-timestamp snapshots and the
//! strike/vol frames the estimators consume.

pub mod frames;
pub mod quotes;
pub mod snapshot;

pub use frames::{join_frames, ForwardRow, RatesRow, SmileInput, StrikeVol, StrikeVolRow};
pub use quotes::{
    implied_counter_rate, normalize_raw_quotes, parse_timestamp, Instrument, Quote, QuoteTable,
    Timestamp,
};
pub use snapshot::{build_snapshots, check_schema, Exclusion, MarketSnapshot, SnapshotSet, MIN_VOL_QUOTES};
