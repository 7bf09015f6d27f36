//! Named integer enumerations shared across the executor, stop machine,
//! signal resolver and drivers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    LongOnly,
    ShortOnly,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeType {
    Amount,
    Value,
    Percent,
    TargetAmount,
    TargetValue,
    TargetPercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// `+1` for Buy, `-1` for Sell — the sign convention used by invariant 1.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Ignored,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatusInfo {
    None,
    SizeNaN,
    PriceNaN,
    ValPriceNaN,
    ValueNaN,
    ValueZeroNeg,
    SizeZero,
    NoCashShort,
    NoCashLong,
    NoOpenPosition,
    MaxSizeExceeded,
    RandomEvent,
    CantCoverFees,
    MinSizeNotReached,
    PartialFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceAreaVioMode {
    Ignore,
    Cap,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulationMode {
    Disabled,
    AddOnly,
    RemoveOnly,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictMode {
    Ignore,
    Entry,
    Exit,
    Adjacent,
    Opposite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionConflictMode {
    Ignore,
    Long,
    Short,
    Adjacent,
    Opposite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OppositeEntryMode {
    Ignore,
    Close,
    CloseReduce,
    Reverse,
    ReverseReduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopEntryPrice {
    ValPrice,
    Price,
    FillPrice,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopExitPrice {
    StopMarket,
    StopLimit,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopExitMode {
    Close,
    CloseReduce,
    Reverse,
    ReverseReduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopUpdateMode {
    Keep,
    Override,
    OverrideNaN,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalPriority {
    Stop,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn sign(self) -> f64 {
        match self {
            TradeDirection::Long => 1.0,
            TradeDirection::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSeqType {
    Default,
    Reversed,
    Random,
    Auto,
}
