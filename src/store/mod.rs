//! Persistence layer: rolling JSONL stores and atomic state files.

pub mod rolling;
pub mod state;

pub use rolling::{RollingStore, Stamped};
pub use state::StateFile;

use crate::core::types::{DecisionRecord, TradeRecord};

/// Bounded-retention decision history consumed by the oracle as context.
pub type HistoryStore = RollingStore<DecisionRecord>;

/// Append-only log of executed opens and closes.
pub type TradeLog = RollingStore<TradeRecord>;
