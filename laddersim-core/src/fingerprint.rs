//! Deterministic identification of traces, configs and data.
//!
//! - `trace_hash`: BLAKE3 over the normalized event list. Two runs with the
//!   same trace hash made the same transitions at bit-identical prices.
//! - `config_hash`: BLAKE3 over the canonical JSON of a `StrategyConfig`.
//! - `dataset_hash`: BLAKE3 over the raw candle fields.

use crate::config::StrategyConfig;
use crate::domain::{Candle, ConfigHash, DatasetHash, SimulationEvent, TraceHash};

/// Hash of the event trace.
///
/// Descriptions are free text and excluded; every numeric field is hashed by
/// its IEEE-754 bit pattern, so `-0.0` and `0.0` differ and nothing is
/// lost to formatting.
pub fn trace_hash(events: &[SimulationEvent]) -> TraceHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(events.len() as u64).to_le_bytes());
    for event in events {
        hasher.update(event.event_type.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&event.timestamp.to_le_bytes());
        hasher.update(&event.price.to_bits().to_le_bytes());
        hasher.update(&event.remaining_position.to_bits().to_le_bytes());
        hasher.update(&event.pnl_so_far.to_bits().to_le_bytes());
        match event.leg_index {
            Some(index) => {
                hasher.update(&[1]);
                hasher.update(&(index as u64).to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
    TraceHash::from_hash(hasher.finalize())
}

/// Hash of a strategy configuration.
///
/// Canonical serialization: struct fields serialize in declaration order, so
/// the JSON is deterministic.
pub fn config_hash(config: &StrategyConfig) -> Result<ConfigHash, serde_json::Error> {
    let json = serde_json::to_string(config)?;
    Ok(ConfigHash::from_hash(blake3::hash(json.as_bytes())))
}

/// Hash of a candle series.
pub fn dataset_hash(candles: &[Candle]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.timestamp.to_le_bytes());
        for v in [c.open, c.high, c.low, c.close, c.volume] {
            hasher.update(&v.to_bits().to_le_bytes());
        }
    }
    DatasetHash::from_hash(hasher.finalize())
}
