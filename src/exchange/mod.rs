//! Execution capability seam.
//!
//! The loop does not speak any exchange protocol; it consumes a narrow
//! capability: open a position, close it, ask what is currently held, ask
//! for equity. Any failure is a generic execution error - the state machine
//! decides what that means (revert a pending open, retry a pending close).

pub mod paper;
pub mod rest;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::types::Side;
use crate::error::CycleError;

/// A confirmed fill.
#[derive(Debug, Clone)]
pub struct Fill {
    pub price: Decimal,
    pub size: Decimal,
    /// Realized PnL; present on closes
    pub pnl: Option<Decimal>,
}

/// A position as the exchange reports it, used for startup reconciliation.
#[derive(Debug, Clone)]
pub struct ExchangePosition {
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
}

#[async_trait]
pub trait Execution: Send + Sync {
    async fn open(
        &self,
        side: Side,
        size: Decimal,
        stop: Decimal,
        target: Decimal,
        max_slippage_pct: Decimal,
    ) -> Result<Fill, CycleError>;

    async fn close(&self, reason: &str) -> Result<Fill, CycleError>;

    async fn query_position(&self) -> Result<Option<ExchangePosition>, CycleError>;

    async fn equity(&self) -> Result<Decimal, CycleError>;

    /// Latest observed price, pushed once per cycle. Live venues ignore it;
    /// the paper exchange fills against it.
    async fn update_mark(&self, _price: Decimal) -> Result<(), CycleError> {
        Ok(())
    }
}
