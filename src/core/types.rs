//! Core type definitions for the trading loop.
//!
//! These types are used throughout the system and represent the fundamental
//! concepts: market candles, position records, oracle instructions and the
//! append-only decision/trade records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a single price candle (OHLCV)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Timestamp of the candle open
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        ts: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self { ts, open, high, low, close, volume }
    }

    /// Full range (high - low)
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional constraint derived from the higher timeframe.
///
/// Entry proposals must not contradict this; a conflicting proposal is a
/// block, never an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    LongOnly,
    ShortOnly,
    /// No constraint (bias filter disabled)
    Unconstrained,
}

impl Bias {
    /// Whether a proposed side is compatible with this bias.
    pub fn permits(&self, side: Side) -> bool {
        match self {
            Bias::LongOnly => side == Side::Long,
            Bias::ShortOnly => side == Side::Short,
            Bias::Unconstrained => true,
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::LongOnly => write!(f, "long-only"),
            Bias::ShortOnly => write!(f, "short-only"),
            Bias::Unconstrained => write!(f, "unconstrained"),
        }
    }
}

/// The single position record. At most one exists system-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
    /// Discretionary closes are refused before this instant.
    pub minimum_hold_until: DateTime<Utc>,
}

impl Position {
    /// Whether the given price touches the stop-loss level.
    pub fn stop_touched(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    /// Whether the given price touches the take-profit level.
    pub fn target_touched(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }
}

/// Normalized instruction produced by the orchestrator for an entry cycle.
///
/// The closed set the rest of the loop dispatches on. Malformed oracle
/// output is a first-class variant, mapped to hold - never an error unwound
/// through the loop, and never an implicit open or close.
#[derive(Debug, Clone)]
pub enum Instruction {
    Open {
        side: Side,
        size: Decimal,
        stop: Decimal,
        target: Decimal,
        max_slippage_pct: Decimal,
        pattern: String,
        reason: String,
    },
    Hold { reason: String },
    Close { reason: String },
    Malformed { raw: String },
}

/// Monitoring verdict while a position is open.
///
/// Deliberately has no side field: a flip cannot be expressed, parsed or
/// compiled in the monitoring path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorAction {
    Hold,
    Close { reason: String },
}

/// One immutable entry in the decision history store. Duplicates are valid
/// (repeated holds); ordering is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// "long" | "short" | "hold" | "close" | "veto" | "malformed"
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_slippage_pct: Option<Decimal>,
}

impl DecisionRecord {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: "hold".to_string(),
            pattern: None,
            reason: reason.into(),
            stop_loss_pct: None,
            take_profit_pct: None,
            max_slippage_pct: None,
        }
    }

    pub fn veto(reason: impl Into<String>) -> Self {
        Self {
            action: "veto".to_string(),
            pattern: None,
            reason: reason.into(),
            stop_loss_pct: None,
            take_profit_pct: None,
            max_slippage_pct: None,
        }
    }

    pub fn close(reason: impl Into<String>) -> Self {
        Self {
            action: "close".to_string(),
            pattern: None,
            reason: reason.into(),
            stop_loss_pct: None,
            take_profit_pct: None,
            max_slippage_pct: None,
        }
    }
}

/// Result payload of an executed open or close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    /// "open" | "close"
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    pub size: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
}

/// One entry in the trade log: the decision that caused the trade, the
/// fill payload and the resulting price. Appended exactly once per executed
/// open or close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub decision: DecisionRecord,
    pub result: TradeResult,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn position(side: Side) -> Position {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        Position {
            side,
            entry_price: dec!(2500),
            size: dec!(1),
            stop_loss: match side {
                Side::Long => dec!(2450),
                Side::Short => dec!(2550),
            },
            take_profit: match side {
                Side::Long => dec!(2600),
                Side::Short => dec!(2400),
            },
            opened_at: t,
            minimum_hold_until: t + chrono::Duration::minutes(15),
        }
    }

    #[test]
    fn long_stop_and_target() {
        let pos = position(Side::Long);
        assert!(pos.stop_touched(dec!(2450)));
        assert!(pos.stop_touched(dec!(2449)));
        assert!(!pos.stop_touched(dec!(2451)));
        assert!(pos.target_touched(dec!(2600)));
        assert!(!pos.target_touched(dec!(2599)));
    }

    #[test]
    fn short_stop_and_target() {
        let pos = position(Side::Short);
        assert!(pos.stop_touched(dec!(2550)));
        assert!(!pos.stop_touched(dec!(2549)));
        assert!(pos.target_touched(dec!(2400)));
        assert!(!pos.target_touched(dec!(2401)));
    }

    #[test]
    fn bias_intersection() {
        assert!(Bias::LongOnly.permits(Side::Long));
        assert!(!Bias::LongOnly.permits(Side::Short));
        assert!(!Bias::ShortOnly.permits(Side::Long));
        assert!(Bias::Unconstrained.permits(Side::Short));
    }
}
