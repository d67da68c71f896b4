//! Candle-by-candle simulation loop.
//!
//! Four phases per candle:
//! 1. Entry: when flat, evaluate the entry or re-entry trigger
//! 2. Ladder: check each unfired leg in index order
//! 3. Stops: fixed and trailing, tighter level wins (an armed trailing level
//!    wins ties)
//! 4. Post-bar: update extremes, mark to close, accrue borrow for held candles
//!
//! Candles are pulled one at a time through the causal accessor, and the
//! market snapshot handed to the cost model only contains candles that closed
//! before the one being evaluated.

use tracing::debug;

use crate::accessor::CausalAccessor;
use crate::config::{ConfigError, EntryTrigger, ReEntryTrigger, StrategyConfig, TrailingConfig};
use crate::domain::{
    Candle, EventType, Execution, ExecutionAction, Position, PositionSide, SimulationEvent,
    TradeSide, INITIAL_SIZE, SIZE_EPSILON,
};
use crate::error::SimError;
use crate::execution::{CostModel, FillLeg, MarketContext, Quote};
use crate::fingerprint::trace_hash;
use crate::rng::SimRng;

use super::result::{NoTradeReason, PositionSummary, SimulationResult};
use super::state::{Phase, RunState};

const DAY_SECS: i64 = 86_400;

/// Outcome of evaluating the entry trigger on one candle.
enum EntrySignal {
    Wait,
    Expired,
    /// Fill at `price`. Immediate entries fill at the open and still see the
    /// rest of the candle; conditional ones start exits on the next candle.
    Fire { price: f64, immediate: bool },
}

/// What closed (part of) the position.
#[derive(Debug, Clone, Copy)]
enum ExitKind {
    Ladder { index: usize, target_multiple: f64 },
    StopLoss,
    TrailingStop,
    Final,
}

/// Validated strategy plus its cost model. Stateless between runs.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: StrategyConfig,
    cost: CostModel,
}

impl Simulator {
    pub fn new(config: &StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            cost: CostModel::new(&config.cost, config.position_notional),
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Run over the candles with `timestamp >= start_ts`.
    pub fn run(
        &self,
        accessor: &dyn CausalAccessor,
        start_ts: i64,
        rng: &mut SimRng,
    ) -> Result<SimulationResult, SimError> {
        let interval_secs = i64::try_from(accessor.interval().as_secs())
            .unwrap_or(i64::MAX)
            .max(1);
        let mut state = RunState::new(self.config.side);
        let mut cursor = start_ts.saturating_sub(1);
        let mut previous: Option<i64> = None;
        let mut last_candle: Option<Candle> = None;

        loop {
            if self
                .config
                .max_candles
                .is_some_and(|max| state.window_len >= max)
            {
                break;
            }
            let next = accessor
                .next_candle_after(cursor)
                .map_err(|source| SimError::Accessor {
                    timestamp: cursor,
                    source,
                })?;
            let Some(candle) = next else {
                break;
            };
            cursor = candle.timestamp;
            state.window_len += 1;

            let elapsed_secs = match previous {
                Some(prev) => {
                    let missing = (candle.timestamp - prev) / interval_secs - 1;
                    if missing > 0 {
                        state.gaps_skipped += missing as u64;
                        debug!(from = prev, to = candle.timestamp, missing, "gap in candle series");
                    }
                    candle.timestamp - prev
                }
                None => interval_secs,
            };

            if !state.is_done() {
                if self.cost.needs_market() {
                    state.last_market =
                        self.market_context(accessor, candle.timestamp - 1, interval_secs)?;
                }
                self.step(&mut state, &candle, start_ts, elapsed_secs, rng)?;
            }
            previous = Some(candle.timestamp);
            last_candle = Some(candle);
        }

        if let Some(candle) = last_candle {
            if state.position.is_open() {
                let size = state.position.size;
                self.exit(&mut state, candle.timestamp, candle.close, size, true, ExitKind::Final, rng)?;
            }
        }

        if state.window_len == 0 {
            state.no_trade = Some(NoTradeReason::NoData);
        } else if state.phase == Phase::AwaitingEntry {
            state.no_trade = Some(NoTradeReason::EntryNotTriggered);
        }
        state.phase = Phase::Done;

        Ok(self.finish(state, rng.seed()))
    }

    fn finish(&self, state: RunState, seed: u64) -> SimulationResult {
        let position = &state.position;
        let (entry_price, final_price, final_pnl) = match state.first_entry_price {
            Some(entry) => {
                let exit = position.last_exit_price.unwrap_or(entry);
                (entry, exit, position.net_multiplier(exit))
            }
            None => (0.0, 0.0, 1.0),
        };
        SimulationResult {
            trace_hash: trace_hash(&state.events),
            summary: PositionSummary::from_position(position),
            entry_price,
            final_price,
            final_pnl,
            total_candles: state.window_len,
            seed,
            gaps_skipped: state.gaps_skipped,
            no_trade: state.no_trade,
            events: state.events,
        }
    }

    /// Snapshot of the trailing day as of `as_of`.
    fn market_context(
        &self,
        accessor: &dyn CausalAccessor,
        as_of: i64,
        interval_secs: i64,
    ) -> Result<MarketContext, SimError> {
        let lookback = usize::try_from(DAY_SECS.saturating_add(interval_secs - 1) / interval_secs)
            .unwrap_or(usize::MAX);
        let snapshot = accessor
            .candles_as_of(as_of, Some(lookback))
            .map_err(|source| SimError::Accessor {
                timestamp: as_of,
                source,
            })?;
        let volume_24h = snapshot
            .iter()
            .filter(|c| c.timestamp > as_of - DAY_SECS)
            .map(|c| c.volume)
            .sum();
        Ok(match snapshot.last() {
            Some(last) => MarketContext {
                volume_24h,
                volatility: last.range_fraction(),
                candle_volume: last.volume,
            },
            None => MarketContext {
                volume_24h,
                ..MarketContext::default()
            },
        })
    }

    fn step(
        &self,
        state: &mut RunState,
        candle: &Candle,
        start_ts: i64,
        elapsed_secs: i64,
        rng: &mut SimRng,
    ) -> Result<(), SimError> {
        let mut evaluate_exits = true;
        match state.phase {
            Phase::Done => return Ok(()),
            Phase::Open => {}
            Phase::AwaitingEntry => match self.entry_signal(state, candle, start_ts) {
                EntrySignal::Wait => return Ok(()),
                EntrySignal::Expired => {
                    debug!(ts = candle.timestamp, "entry trigger expired");
                    state.phase = Phase::Done;
                    state.no_trade = Some(NoTradeReason::EntryNotTriggered);
                    return Ok(());
                }
                EntrySignal::Fire { price, immediate } => {
                    self.open(state, candle.timestamp, price, INITIAL_SIZE, ExecutionAction::Entry, rng)?;
                    evaluate_exits = immediate;
                }
            },
            Phase::AwaitingReEntry => {
                let Some(price) = self.re_entry_price(&state.position, candle) else {
                    return Ok(());
                };
                let quantity = self.config.re_entry.size_percent * state.position.initial_size;
                self.open(state, candle.timestamp, price, quantity, ExecutionAction::ReEntry, rng)?;
                evaluate_exits = false;
            }
        }

        if evaluate_exits {
            self.check_ladder(state, candle, rng)?;
            if state.position.is_open() {
                self.check_stops(state, candle, rng)?;
            }
        }

        if state.position.is_open() {
            // After a mid-bar entry only the close is known to follow the fill.
            if evaluate_exits {
                state.position.update_extremes(candle.high, candle.low);
            } else {
                state.position.update_extremes(candle.close, candle.close);
            }
            state.position.mark(candle.close);
            // Borrow starts with the first full candle held; a mid-bar fill
            // has no known fill time inside its candle.
            if evaluate_exits {
                state
                    .position
                    .accrue_borrow(self.config.cost.borrow_apr_bps, elapsed_secs);
            }
        } else if state.phase == Phase::Open {
            state.phase = if self.config.re_entry.is_enabled()
                && state.position.re_entry_count < self.config.re_entry.max_re_entries
            {
                Phase::AwaitingReEntry
            } else {
                Phase::Done
            };
        }
        Ok(())
    }

    fn entry_signal(&self, state: &mut RunState, candle: &Candle, start_ts: i64) -> EntrySignal {
        let reference = *state.entry_reference.get_or_insert(candle.open);
        let trigger = self.config.entry.trigger;
        if trigger == EntryTrigger::Immediate {
            return EntrySignal::Fire {
                price: candle.open,
                immediate: true,
            };
        }
        if let Some(wait) = self.config.entry.max_wait_secs {
            let deadline = start_ts.saturating_add(i64::try_from(wait).unwrap_or(i64::MAX));
            if candle.timestamp > deadline {
                return EntrySignal::Expired;
            }
        }
        match trigger {
            EntryTrigger::Immediate => EntrySignal::Wait,
            EntryTrigger::PriceDrop { percent } => {
                let level = reference * (1.0 - percent);
                if candle.low <= level {
                    EntrySignal::Fire {
                        price: candle.open.min(level),
                        immediate: false,
                    }
                } else {
                    EntrySignal::Wait
                }
            }
            EntryTrigger::Breakout { percent } => {
                let level = reference * (1.0 + percent);
                if candle.high >= level {
                    EntrySignal::Fire {
                        price: candle.open.max(level),
                        immediate: false,
                    }
                } else {
                    EntrySignal::Wait
                }
            }
        }
    }

    fn re_entry_price(&self, position: &Position, candle: &Candle) -> Option<f64> {
        let ReEntryTrigger::Retrace { fraction } = self.config.re_entry.trigger else {
            return None;
        };
        let last_exit = position.last_exit_price?;
        match self.config.side {
            PositionSide::Long => {
                let level = last_exit * (1.0 - fraction);
                (candle.low <= level).then(|| candle.open.min(level))
            }
            PositionSide::Short => {
                let level = last_exit * (1.0 + fraction);
                (candle.high >= level).then(|| candle.open.max(level))
            }
        }
    }

    fn check_ladder(
        &self,
        state: &mut RunState,
        candle: &Candle,
        rng: &mut SimRng,
    ) -> Result<(), SimError> {
        let side = self.config.side;
        for (index, leg) in self.config.legs.iter().enumerate() {
            if !state.position.is_open() {
                break;
            }
            if state.position.ladder_legs_executed.contains(&index) {
                continue;
            }
            let target = side.target_price(state.position.average_entry_price, leg.target_multiple);
            let (hit, gapped) = match side {
                PositionSide::Long => (candle.high >= target, candle.open >= target),
                PositionSide::Short => (candle.low <= target, candle.open <= target),
            };
            if !hit {
                continue;
            }
            let intended = if gapped { candle.open } else { target };
            let quantity = (leg.percent * state.position.initial_size).min(state.position.size);
            state.position.ladder_legs_executed.insert(index);
            self.exit(
                state,
                candle.timestamp,
                intended,
                quantity,
                false,
                ExitKind::Ladder {
                    index,
                    target_multiple: leg.target_multiple,
                },
                rng,
            )?;
        }
        Ok(())
    }

    /// Live stop level and which rule owns it.
    ///
    /// The trailing level uses the extremes recorded before the current
    /// candle and only exists once the activation gain has been reached.
    fn stop_level(&self, position: &Position) -> Option<(f64, ExitKind)> {
        let stop = self.config.stop_loss?;
        let side = self.config.side;
        let entry = position.average_entry_price;
        let fixed = side.stop_price(entry, stop.initial);

        let trailing = match stop.trailing {
            TrailingConfig::None => None,
            TrailingConfig::Active {
                activation,
                distance,
            } => match side {
                PositionSide::Long => (position.peak_price >= entry * (1.0 + activation))
                    .then(|| position.peak_price * (1.0 - distance)),
                PositionSide::Short => (position.lowest_price <= entry * (1.0 - activation))
                    .then(|| position.lowest_price * (1.0 + distance)),
            },
        };

        // An armed trailing level owns ties with the fixed stop.
        let trailing_is_at_least_as_tight = |level: f64| match side {
            PositionSide::Long => level >= fixed,
            PositionSide::Short => level <= fixed,
        };
        match trailing {
            Some(level) if trailing_is_at_least_as_tight(level) => {
                Some((level, ExitKind::TrailingStop))
            }
            _ => Some((fixed, ExitKind::StopLoss)),
        }
    }

    fn check_stops(
        &self,
        state: &mut RunState,
        candle: &Candle,
        rng: &mut SimRng,
    ) -> Result<(), SimError> {
        let Some((level, kind)) = self.stop_level(&state.position) else {
            return Ok(());
        };
        let (hit, gapped) = match self.config.side {
            PositionSide::Long => (candle.low <= level, candle.open <= level),
            PositionSide::Short => (candle.high >= level, candle.open >= level),
        };
        if !hit {
            return Ok(());
        }
        let intended = if gapped { candle.open } else { level };
        let size = state.position.size;
        self.exit(state, candle.timestamp, intended, size, false, kind, rng)
    }

    fn open(
        &self,
        state: &mut RunState,
        timestamp: i64,
        intended: f64,
        quantity: f64,
        action: ExecutionAction,
        rng: &mut SimRng,
    ) -> Result<(), SimError> {
        let side = self.config.side;
        let quote = self.cost.quote(
            side.entry_side(),
            FillLeg::Entry,
            intended,
            quantity,
            false,
            &state.last_market,
            rng,
        );
        check_fill(&quote, timestamp)?;
        let filled = quote.filled_quantity(quantity);

        state.position.apply_entry(execution(timestamp, action, side.entry_side(), intended, filled, &quote));
        debug_assert!(state.position.check_invariants(), "size ledger out of balance");
        state.first_entry_price.get_or_insert(quote.fill_price);

        let (event_type, description) = match action {
            ExecutionAction::ReEntry => (
                EventType::ReEntry,
                format!(
                    "re-entry {} of {} at {:.8}",
                    state.position.re_entry_count, self.config.re_entry.max_re_entries, quote.fill_price
                ),
            ),
            _ => (EventType::Entry, format!("entry at {:.8}", quote.fill_price)),
        };
        push_event(state, event_type, timestamp, quote.fill_price, description, None);
        state.phase = Phase::Open;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn exit(
        &self,
        state: &mut RunState,
        timestamp: i64,
        intended: f64,
        quantity: f64,
        forced: bool,
        kind: ExitKind,
        rng: &mut SimRng,
    ) -> Result<(), SimError> {
        let side = self.config.side;
        let quote = self.cost.quote(
            side.exit_side(),
            FillLeg::Exit,
            intended,
            quantity,
            forced,
            &state.last_market,
            rng,
        );
        check_fill(&quote, timestamp)?;
        let filled = quote.filled_quantity(quantity);

        state.position.apply_exit(execution(
            timestamp,
            ExecutionAction::Exit,
            side.exit_side(),
            intended,
            filled,
            &quote,
        ));
        debug_assert!(state.position.check_invariants(), "size ledger out of balance");

        let flat = state.position.size <= SIZE_EPSILON;
        let (event_type, leg_index, description) = match kind {
            ExitKind::Ladder {
                index,
                target_multiple,
            } => (
                if flat {
                    EventType::TargetHit
                } else {
                    EventType::LadderExit
                },
                Some(index),
                format!("leg {index} at {target_multiple}x released {filled:.6}"),
            ),
            ExitKind::StopLoss => (EventType::StopLoss, None, format!("stop loss at {:.8}", quote.fill_price)),
            ExitKind::TrailingStop => (
                EventType::TrailingStop,
                None,
                format!("trailing stop at {:.8}", quote.fill_price),
            ),
            ExitKind::Final => (EventType::FinalExit, None, format!("final exit at {:.8}", quote.fill_price)),
        };
        push_event(state, event_type, timestamp, quote.fill_price, description, leg_index);
        Ok(())
    }
}

fn execution(
    timestamp: i64,
    action: ExecutionAction,
    side: TradeSide,
    intended: f64,
    filled: f64,
    quote: &Quote,
) -> Execution {
    Execution {
        timestamp,
        action,
        side,
        intended_price: intended,
        fill_price: quote.fill_price,
        quantity: filled,
        fee: quote.fee_paid,
        slippage_bps: quote.slippage_bps,
        partial_fill_fraction: quote.partial_fill_fraction,
        latency_ms: quote.latency_ms,
    }
}

fn push_event(
    state: &mut RunState,
    event_type: EventType,
    timestamp: i64,
    price: f64,
    description: String,
    leg_index: Option<usize>,
) {
    let remaining = state.position.size;
    let pnl_so_far = state.position.net_multiplier(price);
    debug!(event = %event_type, ts = timestamp, price, remaining, pnl_so_far, "transition");
    state.events.push(SimulationEvent {
        event_type,
        timestamp,
        price,
        remaining_position: remaining,
        pnl_so_far,
        description,
        leg_index,
    });
}

fn check_fill(quote: &Quote, timestamp: i64) -> Result<(), SimError> {
    if quote.fill_price.is_finite() && quote.fill_price > 0.0 {
        Ok(())
    } else {
        Err(SimError::Fault {
            timestamp,
            message: format!("fill price {} is not a positive number", quote.fill_price),
        })
    }
}
