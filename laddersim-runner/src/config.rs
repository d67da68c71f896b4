//! Runner configuration, loaded from TOML.
//!
//! ```toml
//! [batch]
//! concurrency = 8
//!
//! [contract]
//! supported = "^1.0"
//!
//! [defaults]
//! master_seed = 42
//! position_notional = 1000.0
//! interval = "1m"
//!
//! [execution]
//! taker_fee_bps = 10.0
//! exit_slippage = { curve = { type = "sqrt", coefficient = 2.0 }, max_bps = 300.0 }
//! ```
//!
//! Every section is optional; `RunnerConfig::default()` is a working config.

use std::path::Path;

use semver::VersionReq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use laddersim_core::config::{ConfigError, CostConfig};
use laddersim_core::domain::CandleInterval;
use laddersim_core::execution::SlippageModel;

use crate::contract::InputDefaults;

/// Errors that make a runner config unusable. These abort a whole batch.
#[derive(Debug, Error)]
pub enum RunnerConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("batch.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("defaults.position_notional must be finite and > 0, got {0}")]
    InvalidNotional(f64),

    #[error("invalid execution override: {0}")]
    Execution(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Worker threads for a batch.
    pub concurrency: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractSection {
    /// Accepted `contractVersion` range.
    pub supported: VersionReq,
}

impl Default for ContractSection {
    fn default() -> Self {
        Self {
            supported: VersionReq::parse("^1.0").unwrap_or(VersionReq::STAR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    /// Seeds for inputs without one are derived from this and the run id.
    pub master_seed: u64,
    pub position_notional: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<CandleInterval>,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            master_seed: 0,
            position_notional: 1.0,
            interval: None,
        }
    }
}

/// Global execution overrides applied to every run's cost config.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taker_fee_bps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrow_apr_bps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_slippage: Option<SlippageModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_slippage: Option<SlippageModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participation: Option<f64>,
}

impl ExecutionSection {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay the configured knobs on `cost`; unset knobs keep the run's value.
    pub fn apply(&self, cost: &mut CostConfig) {
        if let Some(fee) = self.taker_fee_bps {
            cost.taker_fee_bps = fee;
        }
        if let Some(apr) = self.borrow_apr_bps {
            cost.borrow_apr_bps = apr;
        }
        if let Some(model) = self.entry_slippage {
            cost.entry_slippage = Some(model);
        }
        if let Some(model) = self.exit_slippage {
            cost.exit_slippage = Some(model);
        }
        if let Some(cap) = self.max_participation {
            cost.max_participation = Some(cap);
        }
    }

    /// Validate the overrides on their own, against a frictionless base.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut cost = CostConfig::frictionless();
        self.apply(&mut cost);
        cost.validate()
    }
}

/// Complete runner configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub batch: BatchSection,
    pub contract: ContractSection,
    pub defaults: DefaultsSection,
    pub execution: ExecutionSection,
}

impl RunnerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, RunnerConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, RunnerConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), RunnerConfigError> {
        if self.batch.concurrency == 0 {
            return Err(RunnerConfigError::ZeroConcurrency);
        }
        let notional = self.defaults.position_notional;
        if !notional.is_finite() || notional <= 0.0 {
            return Err(RunnerConfigError::InvalidNotional(notional));
        }
        self.execution.validate()?;
        Ok(())
    }

    pub fn input_defaults(&self) -> InputDefaults {
        InputDefaults {
            position_notional: self.defaults.position_notional,
            interval: self.defaults.interval,
        }
    }
}
