//! Batch estimation over every timestamp of a quote table.

pub mod cache;
pub mod orchestrator;
pub mod results;
pub mod scheduler;

use std::path::PathBuf;

pub use cache::{CacheKey, DiskCache};
pub use orchestrator::{
    estimate_mfiv, estimate_probability, estimate_probability_multiple_levels, BatchInput,
};
pub use results::{Cell, EstimateSeries, EstimateTable, EstimationFailure, SeriesEntry, TableRow};
pub use scheduler::{Execution, TaskFailure, TaskOutcome, TaskScheduler};

/// How a batch runs. Never part of a cache key: parallel and sequential runs
/// of the same batch produce the same result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub parallelize: bool,
    /// Pool size when parallel; `None` uses every core.
    pub workers: Option<usize>,
    /// Memoise results under this directory.
    pub cache_dir: Option<PathBuf>,
}

impl BatchOptions {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            parallelize: true,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn execution(&self) -> Execution {
        if self.parallelize {
            Execution::Parallel {
                workers: self.workers,
            }
        } else {
            Execution::Sequential
        }
    }
}
