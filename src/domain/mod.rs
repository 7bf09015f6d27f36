//! Core domain vocabulary: enumerations, requests, state, and records.

pub mod enums;
pub mod order;
pub mod records;
pub mod state;
pub mod trade;

pub use enums::{
    AccumulationMode, CallSeqType, ConflictMode, Direction, DirectionConflictMode,
    OppositeEntryMode, OrderSide, OrderStatus, OrderStatusInfo, PriceAreaVioMode, SignalPriority,
    SizeType, StopEntryPrice, StopExitMode, StopExitPrice, StopUpdateMode, TradeDirection,
    TradeStatus,
};
pub use order::{OrderRequest, PriceArea};
pub use records::{LogRecord, OrderRecord};
pub use state::{EarlyExit, ExecuteOrderState, OrderResult, ProcessOrderState};
pub use trade::TradeRecord;
