//! Typed error surface for the simulation core.
//!
//! Each subsystem owns a narrow error enum; [`SimError`] folds them together
//! at the boundary so every public entry point returns a single `Result` type.

use thiserror::Error;

use crate::domain::enums::{Direction, OrderStatusInfo};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("group_lens sum {sum} does not match column count {cols}")]
    GroupLenMismatch { sum: usize, cols: usize },
    #[error("call sequence row {row} is not a permutation of 0..{len} within its group")]
    InvalidCallSeqPermutation { row: usize, len: usize },
    #[error("{field} must be non-negative, got {value}")]
    NegativeParameter { field: &'static str, value: f64 },
    #[error("{field} must be finite, got NaN")]
    NaNParameter { field: &'static str },
    #[error("max_orders and max_logs must be greater than zero per column")]
    InvalidCapacity,
    #[error("flex array length {len} is incompatible with target shape {shape:?}")]
    IncompatibleFlexShape { len: usize, shape: (usize, usize) },
    #[error("position reversal cannot use SizeType::Percent")]
    PercentReversalForbidden,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cash must be non-negative and finite, got {0}")]
    InvalidCash(f64),
    #[error("position must be finite, got {0}")]
    InvalidPosition(f64),
    #[error("debt must be finite and non-negative, got {0}")]
    InvalidDebt(f64),
    #[error("free_cash must not be NaN")]
    InvalidFreeCash,
    #[error("price area field must be NaN or finite positive, got {0}")]
    InvalidPriceArea(f64),
    #[error("order price must be finite positive after resolution, got {0}")]
    InvalidOrderPrice(f64),
    #[error("fees, fixed_fees and slippage must be non-negative and finite")]
    InvalidFees,
    #[error("min_size must be >= 0 and max_size must be a positive, non-NaN value")]
    InvalidSizeBounds,
    #[error("size_granularity must be NaN or finite positive")]
    InvalidGranularity,
    #[error("reject_prob must lie within [0, 1]")]
    InvalidRejectProb,
    #[error("direction {direction:?} is inconsistent with the current position sign")]
    DirectionMismatch { direction: Direction },
    #[error("price {price} violates the bar's price area [{low}, {high}]")]
    PriceAreaViolation { price: f64, low: f64, high: f64 },
}

#[derive(Debug, Error)]
#[error("{column} buffer exhausted for column {col} (capacity {capacity}); raise max_{column}")]
pub struct CapacityError {
    pub column: &'static str,
    pub col: usize,
    pub capacity: usize,
}

#[derive(Debug, Error)]
#[error("order rejected ({status_info:?}): {message}")]
pub struct RejectedOrderError {
    pub status_info: OrderStatusInfo,
    pub message: String,
}

impl RejectedOrderError {
    pub fn from_status_info(status_info: OrderStatusInfo) -> Self {
        let message = match status_info {
            OrderStatusInfo::NoCashShort => "not enough cash to open or grow a short",
            OrderStatusInfo::NoCashLong => "not enough cash to open or grow a long",
            OrderStatusInfo::NoOpenPosition => "no open position to act on",
            OrderStatusInfo::MaxSizeExceeded => "requested size exceeds max_size",
            OrderStatusInfo::RandomEvent => "order rejected by random reject_prob draw",
            OrderStatusInfo::CantCoverFees => "proceeds or cash cannot cover fees",
            OrderStatusInfo::MinSizeNotReached => "filled size would fall below min_size",
            OrderStatusInfo::ValueZeroNeg => "target value is zero or negative",
            other => return Self::generic(other),
        }
        .to_string();
        Self {
            status_info,
            message,
        }
    }

    fn generic(status_info: OrderStatusInfo) -> Self {
        Self {
            status_info,
            message: format!("order rejected: {status_info:?}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum InfeasibleOrderError {
    #[error("infinite long order with no finite bound on cash or size")]
    InfiniteLong,
    #[error("infinite short order with no finite bound on size")]
    InfiniteShort,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    RejectedOrder(#[from] RejectedOrderError),
    #[error(transparent)]
    Infeasible(#[from] InfeasibleOrderError),
}
