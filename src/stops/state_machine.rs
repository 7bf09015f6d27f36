//! Per-column stop-loss / trailing-stop / take-profit state machine (§4.4).
//!
//! Grounded on `position_management/ratchet.rs`'s tighten-never-loosen
//! register (here specialised to the trailing-SL reference price) and on
//! `position_management/intent.rs`'s "translate to an intent, never execute
//! directly" boundary: this module only ever reports whether a stop fired
//! and at what price; the driver decides what order to build from that.

use serde::{Deserialize, Serialize};

use crate::domain::enums::{StopEntryPrice, StopExitPrice, StopUpdateMode, TradeDirection};
use crate::domain::order::PriceArea;

/// Fixed-size per-column state; advanced in place, never reallocated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopState {
    pub direction: Option<TradeDirection>,
    pub sl_init_bar: i64,
    pub sl_init_price: f64,
    pub sl_ref_bar: i64,
    pub sl_ref_price: f64,
    /// NaN means no stop-loss armed.
    pub sl_stop: f64,
    pub sl_trail: bool,
    pub tp_init_bar: i64,
    pub tp_init_price: f64,
    /// NaN means no take-profit armed.
    pub tp_stop: f64,
}

impl Default for StopState {
    fn default() -> Self {
        Self {
            direction: None,
            sl_init_bar: -1,
            sl_init_price: f64::NAN,
            sl_ref_bar: -1,
            sl_ref_price: f64::NAN,
            sl_stop: f64::NAN,
            sl_trail: false,
            tp_init_bar: -1,
            tp_init_price: f64::NAN,
            tp_stop: f64::NAN,
        }
    }
}

impl StopState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.direction.is_some()
    }

    /// Position opened from flat, or reversed: (re)arm both registers at the
    /// new entry reference, SL ref starting at the init price.
    pub fn arm(
        &mut self,
        direction: TradeDirection,
        bar: i64,
        ref_price: f64,
        sl_stop: f64,
        sl_trail: bool,
        tp_stop: f64,
    ) {
        self.direction = Some(direction);
        self.sl_init_bar = bar;
        self.sl_init_price = ref_price;
        self.sl_ref_bar = bar;
        self.sl_ref_price = ref_price;
        self.sl_stop = sl_stop;
        self.sl_trail = sl_trail;
        self.tp_init_bar = bar;
        self.tp_init_price = ref_price;
        self.tp_stop = tp_stop;
    }

    /// Position closed: clear all registers.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Position grown in the same direction: apply `StopUpdateMode`.
    pub fn update_on_grow(&mut self, new_sl_stop: f64, new_tp_stop: f64, mode: StopUpdateMode) {
        match mode {
            StopUpdateMode::Keep => {}
            StopUpdateMode::Override => {
                if !new_sl_stop.is_nan() {
                    self.sl_stop = new_sl_stop;
                }
                if !new_tp_stop.is_nan() {
                    self.tp_stop = new_tp_stop;
                }
            }
            StopUpdateMode::OverrideNaN => {
                self.sl_stop = new_sl_stop;
                self.tp_stop = new_tp_stop;
            }
        }
    }

    /// Stop-loss hit test for bar `bar_idx`. `None` if disabled or not hit.
    pub fn check_sl(&self, pa: &PriceArea) -> Option<f64> {
        if !self.is_active() || self.sl_stop.is_nan() {
            return None;
        }
        check_hit(self.sl_ref_price, self.sl_stop, self.direction?, true, pa)
    }

    /// Take-profit hit test; uses the opposite comparison direction from SL.
    pub fn check_tp(&self, pa: &PriceArea) -> Option<f64> {
        if !self.is_active() || self.tp_stop.is_nan() {
            return None;
        }
        check_hit(self.tp_init_price, self.tp_stop, self.direction?, false, pa)
    }

    /// Advances the trailing SL reference price after the hit test for this
    /// bar (a no-op unless `sl_trail` is set).
    pub fn advance_trailing(&mut self, bar_idx: i64, pa: &PriceArea) {
        if !self.sl_trail || !self.is_active() {
            return;
        }
        let filled = pa.filled();
        match self.direction.unwrap() {
            TradeDirection::Long => {
                if filled.high > self.sl_ref_price {
                    self.sl_ref_price = filled.high;
                    self.sl_ref_bar = bar_idx;
                }
            }
            TradeDirection::Short => {
                if filled.low < self.sl_ref_price {
                    self.sl_ref_price = filled.low;
                    self.sl_ref_bar = bar_idx;
                }
            }
        }
    }
}

/// Threshold-crossing hit test shared by SL and TP: `hit_below = true` means
/// a long is checking a price drop (SL) or a short a price rise (SL);
/// `hit_below = false` flips both (TP).
fn check_hit(ref_price: f64, stop: f64, direction: TradeDirection, hit_below: bool, pa: &PriceArea) -> Option<f64> {
    if !(stop >= 0.0) {
        return None;
    }
    let filled = pa.filled();
    let sign = match (direction, hit_below) {
        (TradeDirection::Long, true) => -1.0,
        (TradeDirection::Long, false) => 1.0,
        (TradeDirection::Short, true) => 1.0,
        (TradeDirection::Short, false) => -1.0,
    };
    let threshold = ref_price * (1.0 + sign * stop);
    let downward_trigger = matches!(
        (direction, hit_below),
        (TradeDirection::Long, true) | (TradeDirection::Short, false)
    );
    let gap_hit = if downward_trigger {
        filled.open <= threshold
    } else {
        filled.open >= threshold
    };
    if gap_hit {
        Some(filled.open)
    } else if filled.low <= threshold && threshold <= filled.high {
        Some(threshold)
    } else {
        None
    }
}

/// Reference price selected when (re)arming a stop.
pub fn resolve_entry_price(mode: StopEntryPrice, val_price: f64, order_price: f64, fill_price: f64, close: f64) -> f64 {
    match mode {
        StopEntryPrice::ValPrice => val_price,
        StopEntryPrice::Price => order_price,
        StopEntryPrice::FillPrice => fill_price,
        StopEntryPrice::Close => close,
    }
}

/// Exit price used when a stop fires: `StopMarket` applies slippage against
/// the stop price, `StopLimit` uses it exactly, `Close` applies slippage
/// against the bar close.
pub fn resolve_exit_price(mode: StopExitPrice, stop_price: f64, close: f64, slippage: f64, direction: TradeDirection) -> f64 {
    let adverse = |p: f64| match direction {
        TradeDirection::Long => p * (1.0 - slippage),
        TradeDirection::Short => p * (1.0 + slippage),
    };
    match mode {
        StopExitPrice::StopMarket => adverse(stop_price),
        StopExitPrice::StopLimit => stop_price,
        StopExitPrice::Close => adverse(close),
    }
}
