//! Wire contract: `SimInput` in, `SimResult` out.
//!
//! Field names follow the shared engine contract (snake_case), with
//! camelCase and `mint` accepted as aliases so payloads produced by other
//! engines deserialize unchanged. Validation that can fail per run
//! (timestamps, overlay compilation, ladder allocation) happens when the
//! input is lowered to a `StrategyConfig`, never during deserialization.

use chrono::{DateTime, NaiveDateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use laddersim_core::config::{
    ConfigError, CostConfig, EntryConfig, ReEntryConfig, StopLossConfig, StrategyConfig,
    StrategyLeg,
};
use laddersim_core::domain::{
    validate_series, AssetId, Candle, CandleInterval, DataIntegrityError, PositionSide,
    SimulationEvent, TraceHash,
};
use laddersim_core::engine::{NoTradeReason, PositionSummary, SimulationResult};
use laddersim_core::error::ErrorCode;
use laddersim_core::overlay::{ExitOverlay, OverlayCompiler, OverlayError};

/// Contract version this engine implements.
pub const CONTRACT_VERSION: &str = "1.0.0";

/// Unit of every timestamp in a `SimInput` candle list and in the
/// `SimResult` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockResolution {
    #[default]
    #[serde(alias = "s", alias = "sec", alias = "secs")]
    Seconds,
    #[serde(alias = "ms", alias = "millis")]
    Milliseconds,
    #[serde(alias = "m", alias = "min", alias = "mins")]
    Minutes,
    #[serde(alias = "h", alias = "hr", alias = "hrs")]
    Hours,
}

impl ClockResolution {
    fn to_secs(self, ts: i64) -> i64 {
        match self {
            Self::Seconds => ts,
            Self::Milliseconds => ts.div_euclid(1_000),
            Self::Minutes => ts.saturating_mul(60),
            Self::Hours => ts.saturating_mul(3_600),
        }
    }

    fn from_secs(self, ts: i64) -> i64 {
        match self {
            Self::Seconds => ts,
            Self::Milliseconds => ts.saturating_mul(1_000),
            Self::Minutes => ts.div_euclid(60),
            Self::Hours => ts.div_euclid(3_600),
        }
    }
}

/// Exit section of the contract.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default, alias = "profitTargets")]
    pub profit_targets: Vec<StrategyLeg>,
    #[serde(default, alias = "stopLoss")]
    pub stop_loss: Option<StopLossConfig>,
    #[serde(default, alias = "maxCandles", skip_serializing_if = "Option::is_none")]
    pub max_candles: Option<usize>,
}

/// One simulation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimInput {
    #[serde(alias = "runId")]
    pub run_id: String,
    #[serde(default, alias = "strategyId")]
    pub strategy_id: String,
    #[serde(alias = "mint", alias = "assetId")]
    pub asset_id: String,
    /// ISO-8601; offsets are honored, naive values are read as UTC.
    #[serde(alias = "alertTimestamp")]
    pub alert_timestamp: String,
    #[serde(default)]
    pub candles: Vec<Candle>,
    #[serde(default, alias = "entryConfig")]
    pub entry_config: EntryConfig,
    #[serde(default, alias = "exitConfig")]
    pub exit_config: ExitConfig,
    #[serde(default, alias = "reentryConfig", alias = "re_entry_config")]
    pub reentry_config: ReEntryConfig,
    #[serde(default, alias = "costConfig")]
    pub cost_config: CostConfig,
    #[serde(alias = "contractVersion")]
    pub contract_version: String,
    #[serde(default, alias = "clockResolution")]
    pub clock_resolution: ClockResolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub side: PositionSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<CandleInterval>,
    /// Compiled and applied over `exit_config` when present.
    #[serde(default, alias = "exitOverlay", skip_serializing_if = "Option::is_none")]
    pub exit_overlay: Option<ExitOverlay>,
    #[serde(default, alias = "positionNotional", skip_serializing_if = "Option::is_none")]
    pub position_notional: Option<f64>,
}

/// Per-run contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("contract version '{version}' is not supported (requires {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("contract version '{0}' is not a valid semantic version")]
    MalformedVersion(String),

    #[error("alert_timestamp '{0}' is not an ISO-8601 timestamp")]
    InvalidTimestamp(String),

    #[error("cannot determine the candle interval; set `interval` on the input")]
    UnknownInterval,

    #[error("{field} must not be empty")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
}

impl ContractError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::UnsupportedContractVersion,
            Self::Config(_) | Self::Overlay(_) => ErrorCode::ConfigurationError,
            Self::DataIntegrity(_) => ErrorCode::DataIntegrityError,
            Self::MalformedVersion(_)
            | Self::InvalidTimestamp(_)
            | Self::UnknownInterval
            | Self::MissingField { .. } => ErrorCode::InvalidInput,
        }
    }
}

/// Parse a contract version, accepting the short `"1"` / `"1.0"` forms.
pub fn parse_version(raw: &str) -> Result<Version, ContractError> {
    let trimmed = raw.trim().trim_start_matches('v');
    let padded = match trimmed.matches('.').count() {
        0 => format!("{trimmed}.0.0"),
        1 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).map_err(|_| ContractError::MalformedVersion(raw.to_string()))
}

/// Reject versions outside `supported`.
pub fn check_version(raw: &str, supported: &VersionReq) -> Result<Version, ContractError> {
    let version = parse_version(raw)?;
    if supported.matches(&version) {
        Ok(version)
    } else {
        Err(ContractError::UnsupportedVersion {
            version: raw.to_string(),
            supported: supported.to_string(),
        })
    }
}

/// Parse an ISO-8601 alert timestamp to unix seconds.
pub fn parse_alert_timestamp(raw: &str) -> Result<i64, ContractError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc).timestamp());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    Err(ContractError::InvalidTimestamp(raw.to_string()))
}

/// Defaults a runner fills in when an input leaves them out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputDefaults {
    pub position_notional: f64,
    pub interval: Option<CandleInterval>,
}

impl Default for InputDefaults {
    fn default() -> Self {
        Self {
            position_notional: 1.0,
            interval: None,
        }
    }
}

/// A `SimInput` lowered to engine types.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub asset: AssetId,
    pub interval: CandleInterval,
    /// Unix seconds.
    pub start_ts: i64,
    /// Candles with unix-second timestamps.
    pub candles: Vec<Candle>,
    pub config: StrategyConfig,
}

impl SimInput {
    /// Candles with timestamps in unix seconds.
    pub fn candles_in_secs(&self) -> Vec<Candle> {
        let resolution = self.clock_resolution;
        self.candles
            .iter()
            .map(|c| Candle {
                timestamp: resolution.to_secs(c.timestamp),
                ..*c
            })
            .collect()
    }

    /// Lower the wire input to engine types, validating everything that can
    /// fail for this run alone.
    pub fn prepare(&self, defaults: &InputDefaults) -> Result<PreparedRun, ContractError> {
        if self.run_id.trim().is_empty() {
            return Err(ContractError::MissingField { field: "run_id" });
        }
        if self.asset_id.trim().is_empty() {
            return Err(ContractError::MissingField { field: "asset_id" });
        }
        let start_ts = parse_alert_timestamp(&self.alert_timestamp)?;
        let candles = self.candles_in_secs();
        validate_series(&candles)?;

        // An empty series still needs an interval for the accessor; any
        // value works since nothing is ever read.
        let interval = self
            .interval
            .or_else(|| CandleInterval::infer(&candles))
            .or(defaults.interval)
            .or_else(|| candles.is_empty().then_some(CandleInterval::ONE_MINUTE))
            .ok_or(ContractError::UnknownInterval)?;

        let mut config = StrategyConfig {
            side: self.side,
            entry: self.entry_config,
            legs: self.exit_config.profit_targets.clone(),
            stop_loss: self.exit_config.stop_loss,
            re_entry: self.reentry_config,
            cost: self.cost_config,
            max_candles: self.exit_config.max_candles,
            position_notional: self.position_notional.unwrap_or(defaults.position_notional),
        };

        if let Some(overlay) = &self.exit_overlay {
            let available = candles.iter().filter(|c| c.timestamp >= start_ts).count();
            OverlayCompiler::new(interval)
                .with_available_candles(available.max(1))
                .compile(overlay)?
                .apply_to(&mut config);
        }
        config.validate()?;

        Ok(PreparedRun {
            asset: AssetId::new(self.asset_id.clone()),
            interval,
            start_ts,
            candles,
            config,
        })
    }
}

/// Outcome of one successful run on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    pub run_id: String,
    pub strategy_id: String,
    pub asset_id: String,
    pub contract_version: String,
    pub final_pnl: f64,
    pub entry_price: f64,
    pub final_price: f64,
    pub total_candles: usize,
    pub events: Vec<SimulationEvent>,
    pub trace_hash: TraceHash,
    pub seed: u64,
    pub gaps_skipped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_trade: Option<NoTradeReason>,
    #[serde(flatten)]
    pub summary: PositionSummary,
}

impl SimResult {
    /// Wrap an engine result, converting event timestamps back to the
    /// input's clock resolution.
    pub fn from_engine(input: &SimInput, result: SimulationResult) -> Self {
        let resolution = input.clock_resolution;
        let events = result
            .events
            .into_iter()
            .map(|e| SimulationEvent {
                timestamp: resolution.from_secs(e.timestamp),
                ..e
            })
            .collect();
        Self {
            run_id: input.run_id.clone(),
            strategy_id: input.strategy_id.clone(),
            asset_id: input.asset_id.clone(),
            contract_version: CONTRACT_VERSION.to_string(),
            final_pnl: result.final_pnl,
            entry_price: result.entry_price,
            final_price: result.final_price,
            total_candles: result.total_candles,
            events,
            trace_hash: result.trace_hash,
            seed: result.seed,
            gaps_skipped: result.gaps_skipped,
            no_trade: result.no_trade,
            summary: result.summary,
        }
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.event_type.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "run_id": "r1",
            "mint": "So11111111111111111111111111111111111111112",
            "alert_timestamp": "2024-03-01T12:00:00Z",
            "candles": [],
            "contractVersion": "1.0.0"
        }"#
    }

    #[test]
    fn mint_is_an_alias_for_asset_id() {
        let input: SimInput = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(input.asset_id, "So11111111111111111111111111111111111111112");
        assert_eq!(input.clock_resolution, ClockResolution::Seconds);
        assert!(input.seed.is_none());
    }

    #[test]
    fn camel_case_cost_fields() {
        let json = r#"{"takerFeeBps": 10, "entrySlippageBps": 5, "exitSlippageBps": 7}"#;
        let cost: CostConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cost.taker_fee_bps, 10.0);
        assert_eq!(cost.entry_slippage_bps, 5.0);
        assert_eq!(cost.exit_slippage_bps, 7.0);
    }

    #[test]
    fn exit_config_wire_shape() {
        let json = r#"{
            "profit_targets": [{"target": 2.0, "percent": 0.5}, {"target": 3.0, "percent": 0.5}],
            "stop_loss": {"initial": -0.3, "trailing": "none"}
        }"#;
        let exit: ExitConfig = serde_json::from_str(json).unwrap();
        assert_eq!(exit.profit_targets[1], StrategyLeg::new(3.0, 0.5));
        assert_eq!(exit.stop_loss, Some(StopLossConfig::fixed(-0.3)));
    }

    #[test]
    fn alert_timestamp_formats() {
        assert_eq!(parse_alert_timestamp("1970-01-01T00:01:00Z").unwrap(), 60);
        assert_eq!(parse_alert_timestamp("1970-01-01T01:01:00+01:00").unwrap(), 60);
        assert_eq!(parse_alert_timestamp("1970-01-01T00:01:00.500").unwrap(), 60);
        assert_eq!(parse_alert_timestamp("1970-01-01 00:02:00").unwrap(), 120);
        assert!(matches!(
            parse_alert_timestamp("yesterday"),
            Err(ContractError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn version_parsing_is_lenient_about_short_forms() {
        let req = VersionReq::parse("^1.0").unwrap();
        assert!(check_version("1.0.0", &req).is_ok());
        assert!(check_version("1.2", &req).is_ok());
        assert!(check_version("1", &req).is_ok());
        let err = check_version("2.0.0", &req).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedContractVersion);
        let err = check_version("one", &req).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn millisecond_candles_are_normalized() {
        let mut input: SimInput = serde_json::from_str(minimal_json()).unwrap();
        input.clock_resolution = ClockResolution::Milliseconds;
        input.candles = vec![
            Candle::flat(1_709_294_400_000, 1.0, 1.0),
            Candle::flat(1_709_294_460_000, 1.0, 1.0),
        ];
        let prepared = input.prepare(&InputDefaults::default()).unwrap();
        assert_eq!(prepared.candles[0].timestamp, 1_709_294_400);
        assert_eq!(prepared.interval, CandleInterval::ONE_MINUTE);
        assert_eq!(prepared.start_ts, 1_709_294_400);
    }

    #[test]
    fn minute_candles_are_normalized() {
        let json = minimal_json().replace(
            "\"candles\": []",
            "\"candles\": [], \"clock_resolution\": \"m\"",
        );
        let mut input: SimInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input.clock_resolution, ClockResolution::Minutes);
        input.candles = vec![
            Candle::flat(28_488_240, 1.0, 1.0),
            Candle::flat(28_488_245, 1.0, 1.0),
        ];
        let prepared = input.prepare(&InputDefaults::default()).unwrap();
        assert_eq!(prepared.candles[0].timestamp, 1_709_294_400);
        assert_eq!(prepared.interval, CandleInterval::FIVE_MINUTES);
        assert_eq!(ClockResolution::Minutes.from_secs(1_709_294_459), 28_488_240);
    }

    #[test]
    fn hour_candles_are_normalized() {
        let json = minimal_json().replace(
            "\"candles\": []",
            "\"candles\": [], \"clock_resolution\": \"h\"",
        );
        let mut input: SimInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input.clock_resolution, ClockResolution::Hours);
        input.candles = vec![
            Candle::flat(474_804, 1.0, 1.0),
            Candle::flat(474_805, 1.0, 1.0),
        ];
        let prepared = input.prepare(&InputDefaults::default()).unwrap();
        assert_eq!(prepared.candles[1].timestamp, 1_709_298_000);
        assert_eq!(prepared.interval, CandleInterval::ONE_HOUR);
        assert_eq!(ClockResolution::Hours.to_secs(i64::MAX), i64::MAX);
        assert_eq!(ClockResolution::Hours.from_secs(1_709_298_000), 474_805);
    }

    #[test]
    fn clock_resolution_long_names() {
        let parse =
            |s: &str| serde_json::from_str::<ClockResolution>(&format!("\"{s}\"")).unwrap();
        assert_eq!(parse("minutes"), ClockResolution::Minutes);
        assert_eq!(parse("min"), ClockResolution::Minutes);
        assert_eq!(parse("hours"), ClockResolution::Hours);
        assert_eq!(parse("hr"), ClockResolution::Hours);
        assert_eq!(parse("ms"), ClockResolution::Milliseconds);
    }

    #[test]
    fn overlay_replaces_exit_config() {
        let mut input: SimInput = serde_json::from_str(minimal_json()).unwrap();
        input.exit_config.profit_targets = vec![StrategyLeg::new(5.0, 1.0)];
        input.exit_overlay = Some(ExitOverlay::TakeProfit {
            take_pct: 100.0,
            percent: None,
        });
        let prepared = input.prepare(&InputDefaults::default()).unwrap();
        assert_eq!(prepared.config.legs, vec![StrategyLeg::new(2.0, 1.0)]);
    }

    #[test]
    fn over_allocated_ladder_is_a_configuration_error() {
        let mut input: SimInput = serde_json::from_str(minimal_json()).unwrap();
        input.exit_config.profit_targets =
            vec![StrategyLeg::new(2.0, 0.8), StrategyLeg::new(3.0, 0.8)];
        let err = input.prepare(&InputDefaults::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn single_candle_without_interval_is_rejected() {
        let mut input: SimInput = serde_json::from_str(minimal_json()).unwrap();
        input.candles = vec![Candle::flat(1_709_294_400, 1.0, 1.0)];
        let err = input.prepare(&InputDefaults::default()).unwrap_err();
        assert_eq!(err, ContractError::UnknownInterval);

        let defaults = InputDefaults {
            interval: Some(CandleInterval::FIVE_MINUTES),
            ..InputDefaults::default()
        };
        assert_eq!(
            input.prepare(&defaults).unwrap().interval,
            CandleInterval::FIVE_MINUTES
        );
    }
}
