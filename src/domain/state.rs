//! Pre/post-trade state carried between the driver and the executor.

use serde::{Deserialize, Serialize};

use super::enums::{OrderSide, OrderStatus, OrderStatusInfo};
use crate::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOrderState {
    pub cash: f64,
    pub position: f64,
    pub debt: f64,
    pub free_cash: f64,
}

impl ExecuteOrderState {
    pub fn new(cash: f64, position: f64) -> Self {
        Self {
            cash,
            position,
            debt: 0.0,
            free_cash: cash,
        }
    }

    /// Validates the invariants in §3.2: `cash >= 0` and finite, `position`
    /// finite, `debt` finite and `>= 0`, `free_cash` not NaN.
    pub fn validate(&self) -> Result<(), StateError> {
        if !(self.cash.is_finite() && self.cash >= 0.0) {
            return Err(StateError::InvalidCash(self.cash));
        }
        if !self.position.is_finite() {
            return Err(StateError::InvalidPosition(self.position));
        }
        if !(self.debt.is_finite() && self.debt >= 0.0) {
            return Err(StateError::InvalidDebt(self.debt));
        }
        if self.free_cash.is_nan() {
            return Err(StateError::InvalidFreeCash);
        }
        Ok(())
    }

    /// Average price at which the current short position was opened,
    /// derived from `debt = |position| * avg_short_entry_price`. Zero when
    /// there is no open short.
    pub fn avg_short_entry_price(&self) -> f64 {
        if self.position < 0.0 {
            self.debt / (-self.position)
        } else {
            0.0
        }
    }

    /// `free_cash` is always `cash - debt`: debt is the only obligation that
    /// ever separates free cash from total cash (debt is zero whenever
    /// `position >= 0`, so this collapses to `free_cash == cash` outside a
    /// short). Recomputing it this way instead of tracking ad hoc deltas
    /// keeps invariant 3 true by construction.
    pub fn recompute_free_cash(mut self) -> Self {
        self.free_cash = crate::numeric::add(self.cash, -self.debt);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessOrderState {
    pub cash: f64,
    pub position: f64,
    pub debt: f64,
    pub free_cash: f64,
    pub val_price: f64,
    pub value: f64,
}

impl ProcessOrderState {
    pub fn new(init_cash: f64, init_position: f64, val_price: f64) -> Self {
        Self {
            cash: init_cash,
            position: init_position,
            debt: 0.0,
            free_cash: init_cash,
            val_price,
            value: init_cash + init_position * val_price,
        }
    }

    pub fn exec_state(&self) -> ExecuteOrderState {
        ExecuteOrderState {
            cash: self.cash,
            position: self.position,
            debt: self.debt,
            free_cash: self.free_cash,
        }
    }

    pub fn apply_exec(&mut self, s: ExecuteOrderState) {
        self.cash = s.cash;
        self.position = s.position;
        self.debt = s.debt;
        self.free_cash = s.free_cash;
    }

    pub fn asset_value(&self) -> f64 {
        self.position * self.val_price
    }

    pub fn recompute_value(&mut self) {
        self.value = self.cash + self.asset_value();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderResult {
    /// NaN if unfilled.
    pub size: f64,
    pub price: f64,
    pub fees: f64,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub status_info: OrderStatusInfo,
}

impl OrderResult {
    pub fn unfilled(side: OrderSide, status: OrderStatus, status_info: OrderStatusInfo) -> Self {
        Self {
            size: f64::NAN,
            price: f64::NAN,
            fees: f64::NAN,
            side,
            status,
            status_info,
        }
    }

    pub fn filled(side: OrderSide, size: f64, price: f64, fees: f64, status_info: OrderStatusInfo) -> Self {
        Self {
            size,
            price,
            fees,
            side,
            status: OrderStatus::Filled,
            status_info,
        }
    }
}

/// Early-exit outcome produced while resolving an order before it reaches
/// the buy/sell state transition — either the order is a no-op (`Ignored`)
/// or it is actively refused (`Rejected`). Both carry the same
/// `OrderStatusInfo` vocabulary; only the resulting [`OrderStatus`] differs.
#[derive(Debug, Clone, Copy)]
pub enum EarlyExit {
    Ignored(OrderStatusInfo),
    Rejected(OrderStatusInfo),
}

impl EarlyExit {
    pub fn into_result(self, side: OrderSide) -> OrderResult {
        match self {
            EarlyExit::Ignored(info) => OrderResult::unfilled(side, OrderStatus::Ignored, info),
            EarlyExit::Rejected(info) => OrderResult::unfilled(side, OrderStatus::Rejected, info),
        }
    }
}
