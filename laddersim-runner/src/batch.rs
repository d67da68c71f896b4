//! Bounded-concurrency batches.
//!
//! Runs are independent: each gets its own accessor, position and RNG, so a
//! batch is a `par_iter` over inputs inside a dedicated rayon pool. Outcomes
//! come back in input order regardless of scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use laddersim_core::error::ErrorCode;

use crate::contract::SimInput;
use crate::data_loader::InputEntry;
use crate::runner::{RunError, RunOutcome, SimRunner};

/// Something a batch can run: a parsed input or a loaded file entry.
pub trait BatchItem: Sync {
    fn run_id(&self) -> &str;
    fn execute(&self, runner: &SimRunner) -> RunOutcome;
}

impl BatchItem for SimInput {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn execute(&self, runner: &SimRunner) -> RunOutcome {
        runner.run_one(self)
    }
}

impl BatchItem for InputEntry {
    fn run_id(&self) -> &str {
        InputEntry::run_id(self)
    }

    fn execute(&self, runner: &SimRunner) -> RunOutcome {
        runner.run_entry(self)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("batch concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Everything a batch produced, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<RunOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<RunOutcome>, elapsed_ms: u64) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        let cancelled = outcomes
            .iter()
            .filter(|o| o.error_code() == Some(ErrorCode::Cancelled))
            .count();
        Self {
            failed: outcomes.len() - succeeded - cancelled,
            outcomes,
            succeeded,
            cancelled,
            elapsed_ms,
        }
    }
}

/// Run `inputs` on `concurrency` threads (the runner config's default when
/// `None`).
///
/// When `cancel` is set, runs that have not started yet report `CANCELLED`;
/// runs already in flight complete. Malformed entries report `INVALID_INPUT`
/// in their slot.
pub fn run_batch<T: BatchItem>(
    runner: &SimRunner,
    inputs: &[T],
    concurrency: Option<usize>,
    cancel: Option<&AtomicBool>,
) -> Result<BatchReport, BatchError> {
    let threads = concurrency.unwrap_or(runner.config().batch.concurrency);
    if threads == 0 {
        return Err(BatchError::ZeroConcurrency);
    }
    let start = Instant::now();
    info!(runs = inputs.len(), threads, "batch started");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?;

    let outcomes: Vec<RunOutcome> = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return RunOutcome::failure(input.run_id(), &RunError::Cancelled);
                }
                input.execute(runner)
            })
            .collect()
    });

    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let report = BatchReport::from_outcomes(outcomes, elapsed_ms);
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        elapsed_ms,
        "batch finished"
    );
    Ok(report)
}
