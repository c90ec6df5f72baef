//! Keyed task execution: submit `(key, task)` pairs, get back `(key, outcome)`
//! pairs sorted by key, whatever order the tasks finished in.
//!
//! Every task runs behind its own failure boundary: an `Err` or a panic is
//! recorded against the task's key and the siblings keep running.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::error::{RndError, Result};

/// How tasks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// In key order on the calling thread, logging progress.
    Sequential,
    /// On a dedicated pool; `None` sizes it to the available cores.
    Parallel { workers: Option<usize> },
}

/// Outcome of one task: its value, or the error that ended it.
pub type TaskOutcome<T> = std::result::Result<T, TaskFailure>;

#[derive(Debug)]
pub enum TaskFailure {
    Error(RndError),
    Panic(String),
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Panic(msg) => write!(f, "task panicked: {msg}"),
        }
    }
}

fn run_guarded<T, F>(task: F) -> TaskOutcome<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskFailure::Error(e)),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(TaskFailure::Panic(msg))
        }
    }
}

pub struct TaskScheduler {
    execution: Execution,
    label: &'static str,
}

impl TaskScheduler {
    pub fn new(execution: Execution) -> Self {
        Self {
            execution,
            label: "tasks",
        }
    }

    /// Name used in progress logs.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Runs every task and returns the outcomes sorted by key.
    ///
    /// Only a failure to build the worker pool is an error here; task
    /// failures are part of the returned outcomes.
    pub fn run<K, T, F>(&self, mut tasks: Vec<(K, F)>) -> Result<Vec<(K, TaskOutcome<T>)>>
    where
        K: Ord + Send,
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        let total = tasks.len();
        let mut outcomes: Vec<(K, TaskOutcome<T>)> = match self.execution {
            Execution::Sequential => {
                tasks.sort_by(|a, b| a.0.cmp(&b.0));
                let step = (total / 10).max(1);
                let mut out = Vec::with_capacity(total);
                for (i, (key, task)) in tasks.into_iter().enumerate() {
                    out.push((key, run_guarded(task)));
                    if (i + 1) % step == 0 || i + 1 == total {
                        info!(label = self.label, done = i + 1, total, "progress");
                    }
                }
                out
            }
            Execution::Parallel { workers } => {
                let threads = workers.unwrap_or_else(rayon::current_num_threads).max(1);
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| RndError::Config {
                        message: format!("could not build worker pool: {e}"),
                    })?;
                debug!(label = self.label, threads, total, "dispatching to worker pool");
                pool.install(|| {
                    tasks
                        .into_par_iter()
                        .map(|(key, task)| (key, run_guarded(task)))
                        .collect()
                })
            }
        };
        // completion order is irrelevant, the key decides
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Task = Box<dyn FnOnce() -> Result<u64> + Send>;

    fn tasks() -> Vec<(u32, Task)> {
        (0..40u32)
            .rev()
            .map(|i| {
                let task: Task = Box::new(move || {
                    if i == 7 {
                        Err(RndError::integration("seven"))
                    } else if i == 13 {
                        panic!("thirteen")
                    } else {
                        Ok(u64::from(i) * 2)
                    }
                });
                (i, task)
            })
            .collect()
    }

    #[test]
    fn outcomes_are_keyed_and_sorted_in_both_modes() {
        let seq = TaskScheduler::new(Execution::Sequential).run(tasks()).unwrap();
        let par = TaskScheduler::new(Execution::Parallel { workers: Some(4) })
            .run(tasks())
            .unwrap();
        let keys = |v: &[(u32, TaskOutcome<u64>)]| v.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        assert_eq!(keys(&seq), (0..40).collect::<Vec<_>>());
        assert_eq!(keys(&seq), keys(&par));
        for (a, b) in seq.iter().zip(&par) {
            assert_eq!(a.1.as_ref().ok(), b.1.as_ref().ok());
        }
    }

    #[test]
    fn failures_and_panics_stay_with_their_task() {
        let out = TaskScheduler::new(Execution::Parallel { workers: Some(2) })
            .run(tasks())
            .unwrap();
        assert!(matches!(out[7].1, Err(TaskFailure::Error(RndError::Integration { .. }))));
        match &out[13].1 {
            Err(TaskFailure::Panic(msg)) => assert!(msg.contains("thirteen")),
            other => panic!("expected a panic outcome, got {other:?}"),
        }
        assert_eq!(out[12].1.as_ref().ok(), Some(&24));
    }
}
