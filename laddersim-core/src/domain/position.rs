//! The single-writer aggregate mutated by the simulator.
//!
//! Sizes are normalized so that `initial_size == 1.0` is the full initial
//! notional, and every PnL figure is a fraction of that notional. A size unit
//! bought at price `e` and sold at price `p` contributes `p / e - 1` (long).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sizes below this are treated as flat.
pub const SIZE_EPSILON: f64 = 1e-12;

/// Normalized size of a full position.
pub const INITIAL_SIZE: f64 = 1.0;

const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Direction of the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    #[default]
    Long,
    Short,
}

/// Direction of a single trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl PositionSide {
    pub fn entry_side(self) -> TradeSide {
        match self {
            Self::Long => TradeSide::Buy,
            Self::Short => TradeSide::Sell,
        }
    }

    pub fn exit_side(self) -> TradeSide {
        match self {
            Self::Long => TradeSide::Sell,
            Self::Short => TradeSide::Buy,
        }
    }

    /// Fractional return of one size unit entered at `entry` and marked at `price`.
    pub fn return_on(self, entry: f64, price: f64) -> f64 {
        match self {
            Self::Long => price / entry - 1.0,
            Self::Short => 1.0 - price / entry,
        }
    }

    /// Price at which a profit multiple is reached.
    ///
    /// Longs need the price to rise by `multiple`, shorts to fall by it.
    pub fn target_price(self, entry: f64, multiple: f64) -> f64 {
        match self {
            Self::Long => entry * multiple,
            Self::Short => entry / multiple,
        }
    }

    /// Price at which a (negative) fractional return threshold is crossed.
    pub fn stop_price(self, entry: f64, threshold: f64) -> f64 {
        match self {
            Self::Long => entry * (1.0 + threshold),
            Self::Short => entry * (1.0 - threshold),
        }
    }
}

/// Lifecycle status of the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Pending,
    Open,
    Closed,
}

/// Why a fill happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAction {
    Entry,
    ReEntry,
    Exit,
}

/// Realized fill record. `fee` is in price × size units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub timestamp: i64,
    pub action: ExecutionAction,
    pub side: TradeSide,
    pub intended_price: f64,
    pub fill_price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub slippage_bps: f64,
    pub partial_fill_fraction: f64,
    pub latency_ms: u64,
}

/// Position state for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub status: PositionStatus,
    pub average_entry_price: f64,
    pub size: f64,
    pub initial_size: f64,
    pub max_size: f64,
    pub peak_price: f64,
    pub lowest_price: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_fees: f64,
    pub borrow_cost: f64,
    pub executions: Vec<Execution>,
    pub ladder_legs_executed: BTreeSet<usize>,
    pub re_entry_count: u32,
    /// Cumulative size entered across the entry and all re-entries.
    pub total_entered: f64,
    /// Cumulative size released by exits.
    pub exited_size: f64,
    pub entry_timestamp: Option<i64>,
    pub last_exit_price: Option<f64>,
    pub last_exit_timestamp: Option<i64>,
}

impl Position {
    pub fn new(side: PositionSide) -> Self {
        Self {
            side,
            status: PositionStatus::Pending,
            average_entry_price: 0.0,
            size: 0.0,
            initial_size: INITIAL_SIZE,
            max_size: 0.0,
            peak_price: 0.0,
            lowest_price: 0.0,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            total_fees: 0.0,
            borrow_cost: 0.0,
            executions: Vec::new(),
            ladder_legs_executed: BTreeSet::new(),
            re_entry_count: 0,
            total_entered: 0.0,
            exited_size: 0.0,
            entry_timestamp: None,
            last_exit_price: None,
            last_exit_timestamp: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open && self.size > SIZE_EPSILON
    }

    /// Apply an entry or re-entry fill.
    pub fn apply_entry(&mut self, execution: Execution) {
        let qty = execution.quantity;
        let was_flat = self.size <= SIZE_EPSILON;
        let new_size = self.size + qty;

        self.average_entry_price = if was_flat {
            execution.fill_price
        } else {
            (self.average_entry_price * self.size + execution.fill_price * qty) / new_size
        };
        self.size = new_size;
        self.total_entered += qty;
        self.max_size = self.max_size.max(new_size);
        self.total_fees += execution.fee / self.average_entry_price;

        if was_flat {
            self.peak_price = execution.fill_price;
            self.lowest_price = execution.fill_price;
        }
        if execution.action == ExecutionAction::ReEntry {
            self.re_entry_count += 1;
        }
        self.entry_timestamp.get_or_insert(execution.timestamp);
        self.status = PositionStatus::Open;
        self.executions.push(execution);
    }

    /// Apply an exit fill. Returns the realized PnL of this fill.
    ///
    /// The quantity is clamped to the current size.
    pub fn apply_exit(&mut self, mut execution: Execution) -> f64 {
        let qty = execution.quantity.min(self.size);
        execution.quantity = qty;

        let pnl = qty * self.side.return_on(self.average_entry_price, execution.fill_price);
        self.realized_pnl += pnl;
        self.total_fees += execution.fee / self.average_entry_price;
        self.size -= qty;
        self.exited_size += qty;

        if self.size <= SIZE_EPSILON {
            self.exited_size += self.size;
            self.size = 0.0;
            self.unrealized_pnl = 0.0;
            self.status = PositionStatus::Closed;
        }
        self.last_exit_price = Some(execution.fill_price);
        self.last_exit_timestamp = Some(execution.timestamp);
        self.executions.push(execution);
        pnl
    }

    /// Unrealized PnL of the current size at `price`. Never cached.
    pub fn unrealized_at(&self, price: f64) -> f64 {
        if self.size <= SIZE_EPSILON {
            return 0.0;
        }
        self.size * self.side.return_on(self.average_entry_price, price)
    }

    /// Gross PnL (before fees) if the position were marked at `price`.
    pub fn total_pnl(&self, price: f64) -> f64 {
        self.realized_pnl + self.unrealized_at(price)
    }

    /// Net PnL multiplier (1.0 = breakeven) if marked at `price`.
    pub fn net_multiplier(&self, price: f64) -> f64 {
        1.0 + self.total_pnl(price) - self.total_fees - self.borrow_cost
    }

    /// Recompute `unrealized_pnl` from the mark price.
    pub fn mark(&mut self, price: f64) {
        self.unrealized_pnl = self.unrealized_at(price);
    }

    /// Track the favorable extremes seen while the position is open.
    pub fn update_extremes(&mut self, high: f64, low: f64) {
        self.peak_price = self.peak_price.max(high);
        self.lowest_price = self.lowest_price.min(low);
    }

    /// Accrue borrow cost for a short held over `elapsed_secs`.
    pub fn accrue_borrow(&mut self, borrow_apr_bps: f64, elapsed_secs: i64) {
        if self.side != PositionSide::Short || self.size <= SIZE_EPSILON || elapsed_secs <= 0 {
            return;
        }
        let year_fraction = elapsed_secs as f64 / SECONDS_PER_YEAR;
        self.borrow_cost += self.size * (borrow_apr_bps / 10_000.0) * year_fraction;
    }

    /// Size ledger: everything entered is either still held or was exited.
    pub fn check_invariants(&self) -> bool {
        let ledger_ok = (self.exited_size + self.size - self.total_entered).abs() < 1e-9;
        let bounds_ok = self.size >= 0.0 && self.size <= self.initial_size + 1e-9;
        ledger_ok && bounds_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(action: ExecutionAction, side: TradeSide, price: f64, qty: f64) -> Execution {
        Execution {
            timestamp: 0,
            action,
            side,
            intended_price: price,
            fill_price: price,
            quantity: qty,
            fee: 0.0,
            slippage_bps: 0.0,
            partial_fill_fraction: 1.0,
            latency_ms: 0,
        }
    }

    #[test]
    fn long_entry_then_partial_exit() {
        let mut pos = Position::new(PositionSide::Long);
        pos.apply_entry(execution(ExecutionAction::Entry, TradeSide::Buy, 1.0, 1.0));
        assert_eq!(pos.status, PositionStatus::Open);

        let pnl = pos.apply_exit(execution(ExecutionAction::Exit, TradeSide::Sell, 2.0, 0.5));
        assert!((pnl - 0.5).abs() < 1e-12);
        assert!((pos.size - 0.5).abs() < 1e-12);
        assert!(pos.check_invariants());
        assert!((pos.net_multiplier(2.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn exit_clamps_to_size_and_closes() {
        let mut pos = Position::new(PositionSide::Long);
        pos.apply_entry(execution(ExecutionAction::Entry, TradeSide::Buy, 1.0, 1.0));
        pos.apply_exit(execution(ExecutionAction::Exit, TradeSide::Sell, 0.7, 5.0));
        assert_eq!(pos.size, 0.0);
        assert_eq!(pos.status, PositionStatus::Closed);
        assert!((pos.realized_pnl + 0.3).abs() < 1e-12);
        assert!(pos.check_invariants());
    }

    #[test]
    fn short_returns_are_inverted() {
        let mut pos = Position::new(PositionSide::Short);
        pos.apply_entry(execution(ExecutionAction::Entry, TradeSide::Sell, 2.0, 1.0));
        assert!((pos.unrealized_at(1.0) - 0.5).abs() < 1e-12);
        assert!((pos.unrealized_at(3.0) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn fees_are_normalized_by_entry_price() {
        let mut pos = Position::new(PositionSide::Long);
        let mut entry = execution(ExecutionAction::Entry, TradeSide::Buy, 4.0, 1.0);
        entry.fee = 4.0 * 0.001; // 10 bps of notional
        pos.apply_entry(entry);
        assert!((pos.total_fees - 0.001).abs() < 1e-12);
    }

    #[test]
    fn re_entry_counts_and_resets_extremes() {
        let mut pos = Position::new(PositionSide::Long);
        pos.apply_entry(execution(ExecutionAction::Entry, TradeSide::Buy, 1.0, 1.0));
        pos.update_extremes(1.5, 0.9);
        pos.apply_exit(execution(ExecutionAction::Exit, TradeSide::Sell, 1.2, 1.0));
        pos.apply_entry(execution(ExecutionAction::ReEntry, TradeSide::Buy, 1.1, 0.5));
        assert_eq!(pos.re_entry_count, 1);
        assert_eq!(pos.peak_price, 1.1);
        assert_eq!(pos.lowest_price, 1.1);
        assert!((pos.total_entered - 1.5).abs() < 1e-12);
        assert!(pos.check_invariants());
    }

    #[test]
    fn borrow_only_accrues_on_shorts() {
        let mut long = Position::new(PositionSide::Long);
        long.apply_entry(execution(ExecutionAction::Entry, TradeSide::Buy, 1.0, 1.0));
        long.accrue_borrow(1_000.0, 86_400);
        assert_eq!(long.borrow_cost, 0.0);

        let mut short = Position::new(PositionSide::Short);
        short.apply_entry(execution(ExecutionAction::Entry, TradeSide::Sell, 1.0, 1.0));
        short.accrue_borrow(3_650.0, 86_400); // 36.5% APR for one day
        assert!((short.borrow_cost - 0.001).abs() < 1e-12);
    }
}
