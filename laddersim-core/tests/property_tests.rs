//! Property tests for simulator invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism: same inputs and seed give a byte-identical result
//! 2. Seed sensitivity: jittered costs make different seeds diverge
//! 3. Size conservation: the trace never oversells and ends flat
//! 4. Fee monotonicity: raising fees never raises PnL
//! 5. Ladder idempotence: each leg fires at most once per run
//! 6. Trace ordering: timestamps never go backwards
//! 7. Mark monotonicity: unrealized PnL moves with price for longs, against it for shorts
//! 8. PnL conservation: total = realized + unrealized for any fill history

use proptest::prelude::*;
use laddersim_core::accessor::UpfrontAccessor;
use laddersim_core::config::{
    CostConfig, ReEntryConfig, StopLossConfig, StrategyConfig, StrategyLeg,
};
use laddersim_core::domain::{
    AssetId, Candle, CandleInterval, EventType, Execution, ExecutionAction, Position,
    PositionSide, SIZE_EPSILON,
};
use laddersim_core::engine::{SimulationResult, Simulator};
use laddersim_core::execution::SlippageModel;
use laddersim_core::rng::SimRng;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random walk of sane candles on a one-minute grid, with occasional gaps.
fn arb_candles() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec(
        (
            -0.08..0.1_f64,
            0.0..0.05_f64,
            0.0..0.05_f64,
            1.0..1_000.0_f64,
            1_i64..3,
        ),
        1..60,
    )
    .prop_map(|steps| {
        let mut price = 1.0_f64;
        let mut ts = 0_i64;
        steps
            .into_iter()
            .map(|(ret, wick_up, wick_down, volume, gap)| {
                let open = price;
                let close = (price * (1.0 + ret)).max(0.01);
                let high = open.max(close) * (1.0 + wick_up);
                let low = open.min(close) * (1.0 - wick_down);
                ts += 60 * gap;
                price = close;
                Candle::new(ts, open, high, low, close, volume)
            })
            .collect()
    })
}

fn arb_legs() -> impl Strategy<Value = Vec<StrategyLeg>> {
    prop::collection::vec((1.05..3.0_f64, 0.1..0.6_f64), 0..4).prop_map(|raw| {
        let total: f64 = raw.iter().map(|(_, pct)| pct).sum();
        let scale = if total > 1.0 { 1.0 / total } else { 1.0 };
        raw.into_iter()
            .map(|(target, pct)| StrategyLeg::new(target, pct * scale))
            .collect()
    })
}

fn arb_stop() -> impl Strategy<Value = Option<StopLossConfig>> {
    prop::option::of((
        -0.5..-0.05_f64,
        prop::option::of((0.0..0.3_f64, 0.02..0.3_f64)),
    ))
    .prop_map(|stop| {
        stop.map(|(initial, trailing)| match trailing {
            Some((activation, distance)) => {
                StopLossConfig::fixed(initial).with_trailing(activation, distance)
            }
            None => StopLossConfig::fixed(initial),
        })
    })
}

fn arb_side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

/// (is_entry, quantity, fill price, fee) steps applied after an opening fill.
fn arb_fills() -> impl Strategy<Value = Vec<(bool, f64, f64, f64)>> {
    prop::collection::vec(
        (any::<bool>(), 0.01..1.0_f64, 0.05..20.0_f64, 0.0..0.01_f64),
        0..12,
    )
}

fn arb_config() -> impl Strategy<Value = StrategyConfig> {
    (
        any::<bool>(),
        arb_legs(),
        arb_stop(),
        0.0..0.3_f64,
        0_u32..3,
        0.0..30.0_f64,
        0.0..40.0_f64,
        0.0..15.0_f64,
    )
        .prop_map(
            |(short, legs, stop_loss, retrace, max_re_entries, fee, slip, jitter)| StrategyConfig {
                side: if short {
                    PositionSide::Short
                } else {
                    PositionSide::Long
                },
                legs,
                stop_loss,
                re_entry: ReEntryConfig::retrace(retrace, max_re_entries, 0.5),
                cost: CostConfig {
                    taker_fee_bps: fee,
                    entry_slippage: Some(SlippageModel::fixed(slip).with_jitter(jitter)),
                    exit_slippage: Some(SlippageModel::fixed(slip).with_jitter(jitter)),
                    borrow_apr_bps: 500.0,
                    ..CostConfig::default()
                },
                ..StrategyConfig::default()
            },
        )
}

// ── Helpers ──────────────────────────────────────────────────────────

fn fill(side: PositionSide, action: ExecutionAction, price: f64, qty: f64, fee: f64) -> Execution {
    let trade_side = if action == ExecutionAction::Exit {
        side.exit_side()
    } else {
        side.entry_side()
    };
    Execution {
        timestamp: 0,
        action,
        side: trade_side,
        intended_price: price,
        fill_price: price,
        quantity: qty,
        fee,
        slippage_bps: 0.0,
        partial_fill_fraction: 1.0,
        latency_ms: 0,
    }
}

/// Open at `entry`, then replay `steps` as re-entries and partial exits.
fn build_position(side: PositionSide, entry: f64, steps: &[(bool, f64, f64, f64)]) -> Position {
    let mut position = Position::new(side);
    position.apply_entry(fill(side, ExecutionAction::Entry, entry, 1.0, 0.0));
    for &(is_entry, qty, price, fee) in steps {
        if is_entry {
            position.apply_entry(fill(side, ExecutionAction::ReEntry, price, qty, fee));
        } else {
            position.apply_exit(fill(side, ExecutionAction::Exit, price, qty, fee));
        }
    }
    position
}

fn run(config: &StrategyConfig, candles: &[Candle], seed: u64) -> SimulationResult {
    let start = candles.first().map_or(0, |c| c.timestamp);
    let accessor = UpfrontAccessor::new(
        AssetId::new("PROP"),
        CandleInterval::ONE_MINUTE,
        candles.to_vec(),
    )
    .unwrap();
    Simulator::new(config)
        .unwrap()
        .run(&accessor, start, &mut SimRng::new(seed))
        .unwrap()
}

// ── 1. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn same_seed_is_byte_identical(
        candles in arb_candles(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let a = run(&config, &candles, seed);
        let b = run(&config, &candles, seed);
        prop_assert_eq!(&a.trace_hash, &b.trace_hash);
        prop_assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}

// ── 2. Seed Sensitivity ──────────────────────────────────────────────

proptest! {
    /// With slippage jitter, the entry fill alone already depends on the seed.
    #[test]
    fn different_seeds_diverge_under_jitter(
        candles in arb_candles(),
        seed_a in any::<u64>(),
        seed_b in any::<u64>(),
    ) {
        prop_assume!(seed_a != seed_b);
        let config = StrategyConfig {
            cost: CostConfig {
                entry_slippage: Some(SlippageModel::fixed(20.0).with_jitter(10.0)),
                ..CostConfig::default()
            },
            ..StrategyConfig::default()
        };
        let a = run(&config, &candles, seed_a);
        let b = run(&config, &candles, seed_b);
        prop_assert_ne!(a.trace_hash, b.trace_hash);
    }
}

// ── 3. Size Conservation ─────────────────────────────────────────────

proptest! {
    #[test]
    fn trace_conserves_size(
        candles in arb_candles(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let result = run(&config, &candles, seed);
        prop_assert!(result.traded());

        for event in &result.events {
            prop_assert!(event.remaining_position >= 0.0);
            prop_assert!(event.remaining_position <= 1.0 + 1e-9);
        }
        prop_assert_eq!(result.events.last().unwrap().remaining_position, 0.0);
        prop_assert_eq!(result.summary.fills, result.events.len());

        let summary = &result.summary;
        let identity = 1.0 + summary.realized_pnl - summary.total_fees - summary.borrow_cost;
        prop_assert!(
            (identity - result.final_pnl).abs() < 1e-4,
            "pnl identity broken: {} vs {}", identity, result.final_pnl
        );
    }

    /// Between two consecutive events, size only grows through an entry.
    #[test]
    fn exits_never_grow_the_position(
        candles in arb_candles(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let result = run(&config, &candles, seed);
        for pair in result.events.windows(2) {
            if pair[1].event_type.is_exit() {
                prop_assert!(pair[1].remaining_position <= pair[0].remaining_position + 1e-12);
            }
        }
    }
}

// ── 4. Fee Monotonicity ──────────────────────────────────────────────

proptest! {
    #[test]
    fn higher_fees_never_increase_pnl(
        candles in arb_candles(),
        config in arb_config(),
        extra_fee in 0.0..50.0_f64,
        seed in any::<u64>(),
    ) {
        let mut dearer = config.clone();
        dearer.cost.taker_fee_bps += extra_fee;

        let cheap = run(&config, &candles, seed);
        let costly = run(&dearer, &candles, seed);
        prop_assert_eq!(cheap.event_types(), costly.event_types());
        prop_assert!(costly.final_pnl <= cheap.final_pnl + 1e-12);
    }
}

// ── 5. Ladder Idempotence ────────────────────────────────────────────

proptest! {
    #[test]
    fn each_leg_fires_at_most_once(
        candles in arb_candles(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let result = run(&config, &candles, seed);
        for index in 0..config.legs.len() {
            let fills = result
                .events
                .iter()
                .filter(|e| e.leg_index == Some(index))
                .count();
            prop_assert!(fills <= 1, "leg {} fired {} times", index, fills);
        }
        for event in &result.events {
            let is_ladder = matches!(
                event.event_type,
                EventType::LadderExit | EventType::TargetHit
            );
            prop_assert_eq!(is_ladder, event.leg_index.is_some());
        }
    }
}

// ── 6. Trace Ordering ────────────────────────────────────────────────

proptest! {
    #[test]
    fn timestamps_never_go_backwards(
        candles in arb_candles(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let result = run(&config, &candles, seed);
        for pair in result.events.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        prop_assert_eq!(result.events.first().map(|e| e.event_type), Some(EventType::Entry));
        prop_assert_eq!(result.total_candles, candles.len());
    }
}

// ── 7. Mark Monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn unrealized_pnl_follows_price_direction(
        side in arb_side(),
        entry in 0.05..20.0_f64,
        steps in arb_fills(),
        a in 0.01..50.0_f64,
        b in 0.01..50.0_f64,
    ) {
        let position = build_position(side, entry, &steps);
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let (at_low, at_high) = (position.unrealized_at(low), position.unrealized_at(high));
        let tolerance = 1e-9 * (1.0 + at_low.abs().max(at_high.abs()));
        match side {
            PositionSide::Long => {
                prop_assert!(at_low <= at_high + tolerance, "{} > {}", at_low, at_high)
            }
            PositionSide::Short => {
                prop_assert!(at_low + tolerance >= at_high, "{} < {}", at_low, at_high)
            }
        }
    }
}

// ── 8. PnL Conservation ──────────────────────────────────────────────

proptest! {
    #[test]
    fn total_pnl_is_realized_plus_unrealized(
        side in arb_side(),
        entry in 0.05..20.0_f64,
        steps in arb_fills(),
        mark in 0.01..50.0_f64,
    ) {
        let mut position = build_position(side, entry, &steps);
        position.mark(mark);
        prop_assert_eq!(position.unrealized_pnl, position.unrealized_at(mark));
        let total = position.total_pnl(mark);
        prop_assert!(
            (total - (position.realized_pnl + position.unrealized_pnl)).abs() < 1e-4,
            "total {} != realized {} + unrealized {}",
            total,
            position.realized_pnl,
            position.unrealized_pnl
        );
        prop_assert!(position.size >= 0.0);
        prop_assert!(position.size <= position.total_entered + 1e-9);
        if position.size <= SIZE_EPSILON {
            prop_assert_eq!(position.unrealized_pnl, 0.0);
        }
    }
}
