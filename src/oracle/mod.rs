//! Decision oracle seam.
//!
//! The pattern oracle proposes an entry (side, pattern label, rationale);
//! a validating risk oracle prices the proposal (stop, target, slippage
//! bounds); the monitor call judges an open position and may only answer
//! hold or close. All three are black boxes behind [`Oracle`]: the loop
//! sends context, receives text, and normalizes it elsewhere
//! ([`crate::oracle::parse`]) into the closed instruction set.

pub mod claude;
pub mod parse;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::types::{Candle, DecisionRecord, Position, Side};
use crate::error::CycleError;
use crate::store::Stamped;

/// Side proposed by the entry oracle. `Flat` means "no trade here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposedSide {
    Long,
    Short,
    Flat,
}

impl ProposedSide {
    pub fn direction(&self) -> Option<Side> {
        match self {
            ProposedSide::Long => Some(Side::Long),
            ProposedSide::Short => Some(Side::Short),
            ProposedSide::Flat => None,
        }
    }
}

/// Entry proposal from the pattern oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryProposal {
    pub side: ProposedSide,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub reason: String,
    /// Fraction of equity to commit; clamped by configuration downstream
    #[serde(default)]
    pub position_fraction: Decimal,
}

/// Risk parameters from the validating oracle. Percentages are magnitudes
/// relative to the entry price; direction comes from the proposed side.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskParams {
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    #[serde(default = "default_slippage")]
    pub max_slippage_pct: Decimal,
}

fn default_slippage() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

/// Context for an entry request: bounded recent history plus the
/// observation window.
pub struct EntryContext<'a> {
    pub candles: &'a [Candle],
    pub recent_decisions: &'a [Stamped<DecisionRecord>],
}

/// Context for a monitor request. Carries the open position; the response
/// shape has no room for a side, so a flip cannot come back.
pub struct MonitorContext<'a> {
    pub candles: &'a [Candle],
    pub position: &'a Position,
}

/// The oracle transport: context in, raw text out. Failures map to
/// [`CycleError::Oracle`] and degrade to hold at the orchestrator.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn entry_text(&self, ctx: &EntryContext<'_>) -> Result<String, CycleError>;

    async fn risk_text(
        &self,
        ctx: &EntryContext<'_>,
        proposal: &EntryProposal,
    ) -> Result<String, CycleError>;

    async fn monitor_text(&self, ctx: &MonitorContext<'_>) -> Result<String, CycleError>;
}
