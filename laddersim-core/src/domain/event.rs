use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a state-machine transition recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Entry,
    TargetHit,
    LadderExit,
    StopLoss,
    TrailingStop,
    FinalExit,
    #[serde(rename = "reentry")]
    ReEntry,
}

impl EventType {
    /// Stable wire name, also used by the trace hash.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::TargetHit => "target_hit",
            Self::LadderExit => "ladder_exit",
            Self::StopLoss => "stop_loss",
            Self::TrailingStop => "trailing_stop",
            Self::FinalExit => "final_exit",
            Self::ReEntry => "reentry",
        }
    }

    pub fn is_exit(self) -> bool {
        !matches!(self, Self::Entry | Self::ReEntry)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub event_type: EventType,
    pub timestamp: i64,
    pub price: f64,
    pub remaining_position: f64,
    /// Net PnL multiplier at the moment of the event (1.0 = breakeven).
    pub pnl_so_far: f64,
    pub description: String,
    /// Ladder leg index for `ladder_exit` / `target_hit` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leg_index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_serde() {
        for kind in [
            EventType::Entry,
            EventType::TargetHit,
            EventType::LadderExit,
            EventType::StopLoss,
            EventType::TrailingStop,
            EventType::FinalExit,
            EventType::ReEntry,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn leg_index_omitted_when_absent() {
        let event = SimulationEvent {
            event_type: EventType::Entry,
            timestamp: 60,
            price: 1.0,
            remaining_position: 1.0,
            pnl_so_far: 1.0,
            description: "entry at 1".into(),
            leg_index: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("leg_index"));
        assert!(json.contains("\"event_type\":\"entry\""));
    }
}
