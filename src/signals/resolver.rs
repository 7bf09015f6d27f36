//! Direction-aware signal conflict resolution and stop-signal synthesis
//! (§4.5). Grounded on `components/signal/mod.rs`'s portfolio-agnostic
//! generator contract — this resolver never reads cash or issues orders
//! itself, it only ever returns an `(size, size_type, direction)` intent
//! for the caller to hand to the executor.

use serde::{Deserialize, Serialize};

use crate::domain::enums::{
    AccumulationMode, ConflictMode, Direction, DirectionConflictMode, OppositeEntryMode, SignalPriority, SizeType,
    StopExitMode, TradeDirection,
};
use crate::error::ConfigError;

/// The four direction-aware booleans a strategy produces for one cell.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignalSet {
    pub is_long_entry: bool,
    pub is_long_exit: bool,
    pub is_short_entry: bool,
    pub is_short_exit: bool,
}

impl SignalSet {
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub conflict_mode: ConflictMode,
    pub direction_conflict_mode: DirectionConflictMode,
    pub opposite_entry_mode: OppositeEntryMode,
    pub accumulate: AccumulationMode,
    pub signal_priority: SignalPriority,
    pub upon_stop_exit: StopExitMode,
}

#[derive(Debug, Clone, Copy)]
pub struct EntrySize {
    pub size: f64,
    pub size_type: SizeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    None,
    LongEntry,
    LongExit,
    LongExitReduce,
    ShortEntry,
    ShortExit,
    ShortExitReduce,
}

/// Synthesizes the exit/entry booleans implied by a stop firing on the
/// currently open position (§4.4's "stop-update policy", step 1 of §4.5).
pub fn synth_stop_signals(mode: StopExitMode, position_direction: TradeDirection) -> SignalSet {
    let mut s = SignalSet::none();
    match position_direction {
        TradeDirection::Long => s.is_long_exit = true,
        TradeDirection::Short => s.is_short_exit = true,
    }
    if matches!(mode, StopExitMode::Reverse | StopExitMode::ReverseReduce) {
        match position_direction {
            TradeDirection::Long => s.is_short_entry = true,
            TradeDirection::Short => s.is_long_entry = true,
        }
    }
    s
}

/// Step 2: collapse an entry/exit pair for one direction using `ConflictMode`.
/// `in_matching_position` is true when the current position already sits in
/// this signal's direction (so "exit" is the state-preserving action).
fn resolve_conflict(entry: bool, exit: bool, in_matching_position: bool, mode: ConflictMode) -> (bool, bool) {
    if !(entry && exit) {
        return (entry, exit);
    }
    match mode {
        ConflictMode::Ignore => (false, false),
        ConflictMode::Entry => (true, false),
        ConflictMode::Exit => (false, true),
        ConflictMode::Adjacent => {
            if in_matching_position {
                (false, true)
            } else {
                (true, false)
            }
        }
        ConflictMode::Opposite => {
            if in_matching_position {
                (true, false)
            } else {
                (false, true)
            }
        }
    }
}

/// Step 3: collapse a simultaneous long-entry/short-entry pair.
fn resolve_direction_conflict(long_entry: bool, short_entry: bool, position: f64, mode: DirectionConflictMode) -> (bool, bool) {
    if !(long_entry && short_entry) {
        return (long_entry, short_entry);
    }
    match mode {
        DirectionConflictMode::Ignore => (false, false),
        DirectionConflictMode::Long => (true, false),
        DirectionConflictMode::Short => (false, true),
        DirectionConflictMode::Adjacent => {
            if position < 0.0 {
                (false, true)
            } else {
                (true, false)
            }
        }
        DirectionConflictMode::Opposite => {
            if position < 0.0 {
                (true, false)
            } else {
                (false, true)
            }
        }
    }
}

/// Picks the single `Action` this cell resolves to, given already
/// conflict-resolved booleans and the `OppositeEntryMode` for an entry that
/// opposes an open position.
fn pick_action(s: SignalSet, position: f64, opposite_entry_mode: OppositeEntryMode) -> Action {
    let is_long = position > 0.0;
    let is_short = position < 0.0;

    if s.is_long_entry {
        if is_short {
            return match opposite_entry_mode {
                OppositeEntryMode::Ignore => Action::None,
                OppositeEntryMode::Close => Action::ShortExit,
                OppositeEntryMode::CloseReduce => Action::ShortExitReduce,
                OppositeEntryMode::Reverse | OppositeEntryMode::ReverseReduce => Action::LongEntry,
            };
        }
        return Action::LongEntry;
    }
    if s.is_short_entry {
        if is_long {
            return match opposite_entry_mode {
                OppositeEntryMode::Ignore => Action::None,
                OppositeEntryMode::Close => Action::LongExit,
                OppositeEntryMode::CloseReduce => Action::LongExitReduce,
                OppositeEntryMode::Reverse | OppositeEntryMode::ReverseReduce => Action::ShortEntry,
            };
        }
        return Action::ShortEntry;
    }
    if s.is_long_exit && is_long {
        return Action::LongExit;
    }
    if s.is_short_exit && is_short {
        return Action::ShortExit;
    }
    Action::None
}

/// Target position size for a partial long-side reduce: move toward flat by
/// `entry.size` without crossing it.
fn reduce_long_target(position: f64, size: f64) -> f64 {
    (position - size).max(0.0)
}

/// Target position size for a partial short-side reduce: move toward flat by
/// `entry.size` without crossing it.
fn reduce_short_target(position: f64, size: f64) -> f64 {
    (position + size).min(0.0)
}

/// Step 5: translate an `Action` plus the accumulation mode into the final
/// `(size, size_type, direction)` order intent.
fn translate(
    action: Action,
    position: f64,
    entry: EntrySize,
    opposite_entry_mode: OppositeEntryMode,
    accumulate: AccumulationMode,
) -> Result<Option<(f64, SizeType, Direction)>, ConfigError> {
    let is_long = position > 0.0;
    let is_short = position < 0.0;

    match action {
        Action::None => Ok(None),
        Action::LongEntry => {
            if is_long && !matches!(accumulate, AccumulationMode::AddOnly | AccumulationMode::Both) {
                return Ok(None);
            }
            if is_short {
                // Opposing entry under Reverse/ReverseReduce: flip the
                // position to flat-then-long (or reduce-then-long) in one
                // order via TargetAmount/TargetValue-style sizing, never
                // Percent.
                if matches!(entry.size_type, SizeType::Percent) {
                    return Err(ConfigError::PercentReversalForbidden);
                }
                let target_size = if matches!(opposite_entry_mode, OppositeEntryMode::ReverseReduce) {
                    0.0
                } else {
                    entry.size
                };
                return Ok(Some((target_size, SizeType::TargetAmount, Direction::Both)));
            }
            Ok(Some((entry.size, entry.size_type, Direction::LongOnly)))
        }
        Action::ShortEntry => {
            if is_short && !matches!(accumulate, AccumulationMode::AddOnly | AccumulationMode::Both) {
                return Ok(None);
            }
            if is_long {
                if matches!(entry.size_type, SizeType::Percent) {
                    return Err(ConfigError::PercentReversalForbidden);
                }
                let target_size = if matches!(opposite_entry_mode, OppositeEntryMode::ReverseReduce) {
                    0.0
                } else {
                    -entry.size
                };
                return Ok(Some((target_size, SizeType::TargetAmount, Direction::Both)));
            }
            Ok(Some((-entry.size, entry.size_type, Direction::ShortOnly)))
        }
        Action::LongExit => {
            let target = if matches!(accumulate, AccumulationMode::RemoveOnly) {
                reduce_long_target(position, entry.size)
            } else {
                0.0
            };
            Ok(Some((target, SizeType::TargetAmount, Direction::Both)))
        }
        Action::ShortExit => {
            let target = if matches!(accumulate, AccumulationMode::RemoveOnly) {
                reduce_short_target(position, entry.size)
            } else {
                0.0
            };
            Ok(Some((target, SizeType::TargetAmount, Direction::Both)))
        }
        Action::LongExitReduce => Ok(Some((reduce_long_target(position, entry.size), SizeType::TargetAmount, Direction::Both))),
        Action::ShortExitReduce => Ok(Some((reduce_short_target(position, entry.size), SizeType::TargetAmount, Direction::Both))),
    }
}

/// Runs the full §4.5 pipeline for one cell, resolving a stop-fired signal
/// set against the user's own signals via `SignalPriority` when both would
/// produce a non-zero order.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    stop_signals: Option<SignalSet>,
    user_signals: SignalSet,
    position: f64,
    entry: EntrySize,
    cfg: ResolverConfig,
) -> Result<Option<(f64, SizeType, Direction)>, ConfigError> {
    let stop_order = stop_signals
        .map(|s| resolve_one(s, position, entry, cfg))
        .transpose()?
        .flatten();
    let user_order = resolve_one(user_signals, position, entry, cfg)?;

    match (stop_order, user_order) {
        (Some(s), Some(u)) => Ok(Some(match cfg.signal_priority {
            SignalPriority::Stop => s,
            SignalPriority::User => u,
        })),
        (Some(s), None) => Ok(Some(s)),
        (None, Some(u)) => Ok(Some(u)),
        (None, None) => Ok(None),
    }
}

fn resolve_one(
    signals: SignalSet,
    position: f64,
    entry: EntrySize,
    cfg: ResolverConfig,
) -> Result<Option<(f64, SizeType, Direction)>, ConfigError> {
    let is_long = position > 0.0;
    let is_short = position < 0.0;

    let (long_entry, long_exit) = resolve_conflict(signals.is_long_entry, signals.is_long_exit, is_long, cfg.conflict_mode);
    let (short_entry, short_exit) = resolve_conflict(signals.is_short_entry, signals.is_short_exit, is_short, cfg.conflict_mode);
    let (long_entry, short_entry) = resolve_direction_conflict(long_entry, short_entry, position, cfg.direction_conflict_mode);

    let resolved = SignalSet {
        is_long_entry: long_entry,
        is_long_exit: long_exit,
        is_short_entry: short_entry,
        is_short_exit: short_exit,
    };
    let action = pick_action(resolved, position, cfg.opposite_entry_mode);
    translate(action, position, entry, cfg.opposite_entry_mode, cfg.accumulate)
}
