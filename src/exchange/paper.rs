//! Paper exchange - simulated fills for dry runs.
//!
//! Fills at the last pushed mark price, tracks equity across closes, and
//! otherwise behaves like the live capability, including refusing to fill
//! when it has never seen a price.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::core::types::Side;
use crate::error::CycleError;

use super::{ExchangePosition, Execution, Fill};

struct PaperState {
    equity: Decimal,
    mark: Option<Decimal>,
    position: Option<ExchangePosition>,
}

pub struct PaperExchange {
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(starting_equity: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                equity: starting_equity,
                mark: None,
                position: None,
            }),
        }
    }
}

#[async_trait]
impl Execution for PaperExchange {
    async fn open(
        &self,
        side: Side,
        size: Decimal,
        _stop: Decimal,
        _target: Decimal,
        _max_slippage_pct: Decimal,
    ) -> Result<Fill, CycleError> {
        let mut state = self.state.lock().await;
        let price = state
            .mark
            .ok_or_else(|| CycleError::Execution("paper fill requires a mark price".to_string()))?;
        if state.position.is_some() {
            return Err(CycleError::Execution("paper position already open".to_string()));
        }
        state.position = Some(ExchangePosition { side, size, entry_price: price });
        Ok(Fill { price, size, pnl: None })
    }

    async fn close(&self, _reason: &str) -> Result<Fill, CycleError> {
        let mut state = self.state.lock().await;
        let price = state
            .mark
            .ok_or_else(|| CycleError::Execution("paper fill requires a mark price".to_string()))?;
        let position = state
            .position
            .take()
            .ok_or_else(|| CycleError::Execution("no paper position to close".to_string()))?;

        let direction = match position.side {
            Side::Long => Decimal::ONE,
            Side::Short => -Decimal::ONE,
        };
        let pnl = (price - position.entry_price) * position.size * direction;
        state.equity += pnl;
        Ok(Fill { price, size: position.size, pnl: Some(pnl) })
    }

    async fn query_position(&self) -> Result<Option<ExchangePosition>, CycleError> {
        Ok(self.state.lock().await.position.clone())
    }

    async fn equity(&self) -> Result<Decimal, CycleError> {
        Ok(self.state.lock().await.equity)
    }

    async fn update_mark(&self, price: Decimal) -> Result<(), CycleError> {
        self.state.lock().await.mark = Some(price);
        Ok(())
    }
}
