//! Simulation errors and the stable error codes reported per run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::accessor::AccessorError;
use crate::config::ConfigError;
use crate::domain::DataIntegrityError;

/// Stable, machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConfigurationError,
    DataIntegrityError,
    NoData,
    SimulationError,
    UnsupportedContractVersion,
    InvalidInput,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::DataIntegrityError => "DATA_INTEGRITY_ERROR",
            Self::NoData => "NO_DATA",
            Self::SimulationError => "SIMULATION_ERROR",
            Self::UnsupportedContractVersion => "UNSUPPORTED_CONTRACT_VERSION",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single simulation run. Never shared across runs.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("candle access failed after {timestamp}: {source}")]
    Accessor {
        timestamp: i64,
        #[source]
        source: AccessorError,
    },

    #[error("simulation fault at {timestamp}: {message}")]
    Fault { timestamp: i64, message: String },
}

impl SimError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigurationError,
            Self::DataIntegrity(_) => ErrorCode::DataIntegrityError,
            Self::Accessor {
                source: AccessorError::Integrity(_),
                ..
            } => ErrorCode::DataIntegrityError,
            Self::Accessor { .. } | Self::Fault { .. } => ErrorCode::SimulationError,
        }
    }
}
