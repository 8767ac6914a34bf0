//! Performance statistics over the trade log window.

use rust_decimal::Decimal;

use crate::core::types::TradeRecord;
use crate::store::Stamped;

/// Win/loss tallies over a set of trade records. Only closes count; opens
/// carry no realized PnL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeStats {
    pub closed: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: Decimal,
}

impl TradeStats {
    pub fn from_trades(trades: &[Stamped<TradeRecord>]) -> Self {
        let mut stats = Self::default();
        for record in trades {
            let Some(pnl) = record.entry.result.pnl else { continue };
            if record.entry.result.kind != "close" {
                continue;
            }
            stats.closed += 1;
            stats.total_pnl += pnl;
            if pnl > Decimal::ZERO {
                stats.wins += 1;
            } else if pnl < Decimal::ZERO {
                stats.losses += 1;
            }
        }
        stats
    }

    /// Percentage of closed trades that won; zero when nothing closed.
    pub fn win_rate_pct(&self) -> Decimal {
        if self.closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins as u64) * Decimal::from(100u64)
            / Decimal::from(self.closed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DecisionRecord, Side, TradeResult};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn close_record(pnl: Decimal) -> Stamped<TradeRecord> {
        Stamped {
            ts: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            entry: TradeRecord {
                decision: DecisionRecord::close("test"),
                result: TradeResult {
                    kind: "close".to_string(),
                    side: Some(Side::Long),
                    size: dec!(1),
                    pnl: Some(pnl),
                },
                price: dec!(2500),
            },
        }
    }

    fn open_record() -> Stamped<TradeRecord> {
        Stamped {
            ts: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            entry: TradeRecord {
                decision: DecisionRecord::hold("test"),
                result: TradeResult {
                    kind: "open".to_string(),
                    side: Some(Side::Long),
                    size: dec!(1),
                    pnl: None,
                },
                price: dec!(2500),
            },
        }
    }

    #[test]
    fn tallies_closes_only() {
        let trades = vec![
            open_record(),
            close_record(dec!(50)),
            open_record(),
            close_record(dec!(-20)),
            close_record(dec!(10)),
        ];
        let stats = TradeStats::from_trades(&trades);
        assert_eq!(stats.closed, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.total_pnl, dec!(40));
    }

    #[test]
    fn win_rate() {
        let trades = vec![close_record(dec!(5)), close_record(dec!(-5))];
        let stats = TradeStats::from_trades(&trades);
        assert_eq!(stats.win_rate_pct(), dec!(50));
        assert_eq!(TradeStats::default().win_rate_pct(), Decimal::ZERO);
    }
}
