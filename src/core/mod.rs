//! Core of the trading loop: types, guard, lifecycle, orchestration.

pub mod guard;
pub mod orchestrator;
pub mod position;
pub mod scheduler;
pub mod stats;
pub mod types;

pub use guard::{DenyReason, GuardConfig, RiskGuard, RiskState, Verdict};
pub use orchestrator::Orchestrator;
pub use position::{CloseTrigger, Lifecycle, MonitorOutcome, PendingOpen};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use types::{
    Bias, Candle, DecisionRecord, Instruction, MonitorAction, Position, Side, TradeRecord,
};
