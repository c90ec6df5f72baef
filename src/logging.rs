//! Subscriber setup for binaries and demos. The library itself only emits
//! `tracing` events.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "rnd_lib=info";

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Returns `false` if a global subscriber was already set.
pub fn init_logging(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}
