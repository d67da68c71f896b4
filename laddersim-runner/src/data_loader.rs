//! File loading for the runner.
//!
//! - Candle CSVs with a `timestamp,open,high,low,close,volume` header.
//! - `SimInput` files: a single JSON object, a JSON array, or JSON lines.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use laddersim_core::domain::{validate_series, Candle, DataIntegrityError, DatasetHash};
use laddersim_core::fingerprint::dataset_hash;

use crate::contract::SimInput;

/// Errors from the loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed candle CSV {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed input JSON {path} (line {line}): {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("candle series in {path} failed validation: {source}")]
    Integrity {
        path: String,
        #[source]
        source: DataIntegrityError,
    },
}

/// A validated candle series and its fingerprint.
#[derive(Debug, Clone)]
pub struct LoadedCandles {
    pub candles: Vec<Candle>,
    pub dataset_hash: DatasetHash,
}

/// Load and validate a candle CSV.
pub fn load_candles_csv(path: &Path) -> Result<LoadedCandles, LoadError> {
    let shown = path.display().to_string();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: shown.clone(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let candles = reader
        .deserialize::<Candle>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LoadError::Csv {
            path: shown.clone(),
            source,
        })?;
    validate_series(&candles).map_err(|source| LoadError::Integrity {
        path: shown.clone(),
        source,
    })?;
    let dataset_hash = dataset_hash(&candles);
    debug!(path = %shown, candles = candles.len(), hash = %dataset_hash, "loaded candle CSV");
    Ok(LoadedCandles {
        candles,
        dataset_hash,
    })
}

/// An input item that could not be turned into a `SimInput`.
///
/// Reported per item so the rest of a batch still runs. `position` is the
/// 1-based array index, or the line number for JSON lines.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("input {position} is not a valid SimInput: {message}")]
pub struct MalformedInput {
    pub run_id: String,
    pub position: usize,
    pub message: String,
}

/// One item of an inputs file.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEntry {
    Parsed(SimInput),
    Malformed(MalformedInput),
}

impl InputEntry {
    pub fn run_id(&self) -> &str {
        match self {
            Self::Parsed(input) => &input.run_id,
            Self::Malformed(bad) => &bad.run_id,
        }
    }

    pub fn into_input(self) -> Result<SimInput, MalformedInput> {
        match self {
            Self::Parsed(input) => Ok(input),
            Self::Malformed(bad) => Err(bad),
        }
    }

    fn from_value(value: serde_json::Value, position: usize) -> Self {
        let run_id = ["run_id", "runId"]
            .iter()
            .find_map(|key| value.get(key).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("input-{position}"));
        match serde_json::from_value::<SimInput>(value) {
            Ok(input) => Self::Parsed(input),
            Err(e) => Self::Malformed(MalformedInput {
                run_id,
                position,
                message: e.to_string(),
            }),
        }
    }
}

/// Parse one or many inputs from JSON text.
///
/// Only text that is not JSON at all fails the whole file. An array item or
/// line that does not deserialize comes back as `InputEntry::Malformed`.
pub fn parse_inputs(content: &str, path: &str) -> Result<Vec<InputEntry>, LoadError> {
    let trimmed = content.trim_start();

    if trimmed.starts_with('[') {
        let items: Vec<serde_json::Value> =
            serde_json::from_str(trimmed).map_err(|source| LoadError::Json {
                path: path.to_string(),
                line: source.line(),
                source,
            })?;
        return Ok(items
            .into_iter()
            .enumerate()
            .map(|(index, value)| InputEntry::from_value(value, index + 1))
            .collect());
    }
    // A single object spanning many lines, or JSON lines.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(vec![InputEntry::from_value(value, 1)]);
    }
    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| match serde_json::from_str(line) {
            Ok(value) => InputEntry::from_value(value, index + 1),
            Err(e) => InputEntry::Malformed(MalformedInput {
                run_id: format!("input-{}", index + 1),
                position: index + 1,
                message: e.to_string(),
            }),
        })
        .collect())
}

/// Load inputs from a `.json` or `.jsonl` file.
pub fn load_inputs(path: &Path) -> Result<Vec<InputEntry>, LoadError> {
    let shown = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: shown.clone(),
        source,
    })?;
    let entries = parse_inputs(&content, &shown)?;
    let malformed = entries
        .iter()
        .filter(|e| matches!(e, InputEntry::Malformed(_)))
        .count();
    debug!(path = %shown, inputs = entries.len(), malformed, "loaded inputs");
    Ok(entries)
}
