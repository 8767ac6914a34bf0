//! Market observation seam.
//!
//! The loop observes the market as OHLCV candles per timeframe, nothing
//! more. A fetch failure is not fatal: the cycle degrades to a no-op and
//! the next tick tries again.

pub mod kucoin;

use async_trait::async_trait;

use crate::core::types::Candle;
use crate::error::CycleError;

/// Candle timeframes the loop consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    /// Execution timeframe
    M5,
    /// Bias timeframe
    M15,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// The most recent `limit` candles, oldest first.
    async fn candles(&self, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, CycleError>;
}
