//! Order request and price-area input types for the executor.

use serde::{Deserialize, Serialize};

use super::enums::{Direction, PriceAreaVioMode, SizeType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub size: f64,
    /// `+inf` = use close, `-inf` = use open, finite positive = use verbatim.
    pub price: f64,
    pub size_type: SizeType,
    pub direction: Direction,
    pub fees: f64,
    pub fixed_fees: f64,
    pub slippage: f64,
    pub min_size: f64,
    pub max_size: f64,
    /// NaN means continuous (no flooring grid).
    pub size_granularity: f64,
    pub reject_prob: f64,
    pub price_area_vio_mode: PriceAreaVioMode,
    pub lock_cash: bool,
    pub allow_partial: bool,
    pub raise_reject: bool,
    pub log: bool,
}

impl OrderRequest {
    /// A market order for `size` shares/contracts with every safety valve at
    /// its least restrictive default: no fees, no cap, continuous
    /// granularity, partial fills allowed.
    pub fn market(size: f64, size_type: SizeType, direction: Direction) -> Self {
        Self {
            size,
            price: f64::INFINITY,
            size_type,
            direction,
            fees: 0.0,
            fixed_fees: 0.0,
            slippage: 0.0,
            min_size: 0.0,
            max_size: f64::INFINITY,
            size_granularity: f64::NAN,
            reject_prob: 0.0,
            price_area_vio_mode: PriceAreaVioMode::Ignore,
            lock_cash: false,
            allow_partial: true,
            raise_reject: false,
            log: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceArea {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceArea {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }

    /// NaN fill-in rule used by stop-hit testing (§4.4): `open` defaults to
    /// `close`, `low` to `min(open, close)`, `high` to `max(open, close)`.
    pub fn filled(&self) -> PriceArea {
        let close = self.close;
        let open = if self.open.is_nan() { close } else { self.open };
        let low = if self.low.is_nan() {
            open.min(close)
        } else {
            self.low
        };
        let high = if self.high.is_nan() {
            open.max(close)
        } else {
            self.high
        };
        PriceArea {
            open,
            high,
            low,
            close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_order_defaults() {
        let o = OrderRequest::market(100.0, SizeType::Amount, Direction::LongOnly);
        assert_eq!(o.price, f64::INFINITY);
        assert_eq!(o.fees, 0.0);
        assert!(o.allow_partial);
    }

    #[test]
    fn price_area_fills_missing_open_from_close() {
        let pa = PriceArea::new(f64::NAN, f64::NAN, f64::NAN, 10.0);
        let filled = pa.filled();
        assert_eq!(filled.open, 10.0);
        assert_eq!(filled.low, 10.0);
        assert_eq!(filled.high, 10.0);
    }

    #[test]
    fn price_area_fills_low_high_from_open_close() {
        let pa = PriceArea::new(9.0, f64::NAN, f64::NAN, 11.0);
        let filled = pa.filled();
        assert_eq!(filled.low, 9.0);
        assert_eq!(filled.high, 11.0);
    }

    #[test]
    fn price_area_keeps_present_fields() {
        let pa = PriceArea::new(9.0, 12.0, 8.0, 11.0);
        let filled = pa.filled();
        assert_eq!(filled.low, 8.0);
        assert_eq!(filled.high, 12.0);
    }
}
