//! Single-run boundary: contract in, tagged outcome out.
//!
//! `SimRunner::run_one` never fails and never panics outward. Whatever goes
//! wrong for one input (bad version, bad config, broken data, a fault inside
//! the simulator) becomes a `RunOutcome::Error` carrying the run id and a
//! stable code.

use std::panic::{catch_unwind, AssertUnwindSafe};

use semver::VersionReq;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use laddersim_core::accessor::UpfrontAccessor;
use laddersim_core::domain::RunId;
use laddersim_core::engine::Simulator;
use laddersim_core::error::{ErrorCode, SimError};
use laddersim_core::rng::{RngHierarchy, SimRng};

use crate::config::{RunnerConfig, RunnerConfigError};
use crate::contract::{check_version, ContractError, InputDefaults, SimInput, SimResult};
use crate::data_loader::{InputEntry, MalformedInput};

/// RNG stream name for per-run seed derivation.
const SEED_STREAM: &str = "run";

/// Errors from one run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Simulation(#[from] SimError),

    #[error(transparent)]
    Malformed(#[from] MalformedInput),

    #[error("simulation panicked: {0}")]
    Panicked(String),

    #[error("run cancelled before it started")]
    Cancelled,
}

impl RunError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Contract(e) => e.code(),
            Self::Simulation(e) => e.code(),
            Self::Malformed(_) => ErrorCode::InvalidInput,
            Self::Panicked(_) => ErrorCode::SimulationError,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }
}

/// Per-run result as written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Ok {
        result: SimResult,
    },
    Error {
        run_id: String,
        code: ErrorCode,
        message: String,
    },
}

impl RunOutcome {
    pub fn failure(run_id: &str, error: &RunError) -> Self {
        Self::Error {
            run_id: run_id.to_string(),
            code: error.code(),
            message: error.to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Ok { result } => &result.run_id,
            Self::Error { run_id, .. } => run_id,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn result(&self) -> Option<&SimResult> {
        match self {
            Self::Ok { result } => Some(result),
            Self::Error { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { code, .. } => Some(*code),
        }
    }
}

/// Validated runner configuration plus its seed hierarchy.
#[derive(Debug, Clone)]
pub struct SimRunner {
    config: RunnerConfig,
    defaults: InputDefaults,
    seeds: RngHierarchy,
}

impl SimRunner {
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerConfigError> {
        config.validate()?;
        Ok(Self {
            defaults: config.input_defaults(),
            seeds: RngHierarchy::new(config.defaults.master_seed),
            config,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn supported_versions(&self) -> &VersionReq {
        &self.config.contract.supported
    }

    /// The input's own seed, or one derived from the master seed and run id.
    pub fn seed_for(&self, input: &SimInput) -> u64 {
        input.seed.unwrap_or_else(|| {
            self.seeds
                .sub_seed(&RunId::new(input.run_id.clone()), SEED_STREAM, 0)
        })
    }

    /// Run one input. Failures come back as `RunOutcome::Error`.
    pub fn run_one(&self, input: &SimInput) -> RunOutcome {
        let attempt = catch_unwind(AssertUnwindSafe(|| self.try_run(input)))
            .unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(payload.as_ref()))));
        match attempt {
            Ok(result) => {
                debug!(run_id = %input.run_id, final_pnl = result.final_pnl, "run finished");
                RunOutcome::Ok { result }
            }
            Err(err) => {
                warn!(run_id = %input.run_id, code = %err.code(), error = %err, "run failed");
                RunOutcome::failure(&input.run_id, &err)
            }
        }
    }

    /// Run one loaded entry. A malformed entry is reported without running.
    pub fn run_entry(&self, entry: &InputEntry) -> RunOutcome {
        match entry {
            InputEntry::Parsed(input) => self.run_one(input),
            InputEntry::Malformed(bad) => {
                let err = RunError::from(bad.clone());
                warn!(run_id = %bad.run_id, position = bad.position, error = %err, "input rejected");
                RunOutcome::failure(&bad.run_id, &err)
            }
        }
    }

    /// Run one input, surfacing the typed error.
    pub fn try_run(&self, input: &SimInput) -> Result<SimResult, RunError> {
        check_version(&input.contract_version, self.supported_versions())?;

        let mut prepared = input.prepare(&self.defaults)?;
        self.config.execution.apply(&mut prepared.config.cost);
        let simulator = Simulator::new(&prepared.config).map_err(ContractError::from)?;

        let accessor = UpfrontAccessor::new(prepared.asset, prepared.interval, prepared.candles)
            .map_err(ContractError::from)?;

        let mut rng = SimRng::new(self.seed_for(input));
        let result = simulator.run(&accessor, prepared.start_ts, &mut rng)?;
        Ok(SimResult::from_engine(input, result))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
