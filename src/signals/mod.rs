//! Direction-aware signal conflict resolution (§4.5).

pub mod resolver;

pub use resolver::{resolve, synth_stop_signals, EntrySize, ResolverConfig, SignalSet};
