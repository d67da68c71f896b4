//! Domain types for laddersim

pub mod candle;
pub mod event;
pub mod ids;
pub mod position;

pub use candle::{validate_series, Candle, CandleInterval, DataIntegrityError, IntervalParseError};
pub use event::{EventType, SimulationEvent};
pub use ids::{AssetId, ConfigHash, DatasetHash, RunId, StrategyId, TraceHash};
pub use position::{
    Execution, ExecutionAction, Position, PositionSide, PositionStatus, TradeSide, INITIAL_SIZE,
    SIZE_EPSILON,
};
