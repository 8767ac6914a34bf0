//! Multi-timeframe bias filter.
//!
//! Reads swing structure off the higher timeframe: higher highs and higher
//! lows permit longs only, lower highs and lower lows permit shorts only,
//! mixed or flat structure vetoes the cycle outright. Entry proposals that
//! contradict the surviving bias are blocked downstream, never overridden.

use rust_decimal::Decimal;

use super::volatility::average_true_range;
use super::FilterDecision;
use crate::core::types::{Bias, Candle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy)]
struct Swing {
    kind: SwingKind,
    price: Decimal,
}

pub struct BiasFilter {
    pub enabled: bool,
    /// Candles of the higher timeframe to analyze
    pub lookback: usize,
    /// Minimum swing-to-swing move, as a fraction of ATR
    pub swing_sensitivity: Decimal,
}

impl BiasFilter {
    pub const NAME: &'static str = "bias";

    /// Returns the directional bias on pass, or a block decision when the
    /// structure does not support trading either way.
    pub fn check(&self, candles: &[Candle]) -> Result<Bias, FilterDecision> {
        if candles.len() < self.lookback {
            return Err(FilterDecision::Block {
                reason: format!(
                    "insufficient higher-timeframe data ({} candles, need {})",
                    candles.len(),
                    self.lookback
                ),
            });
        }

        let recent = &candles[candles.len() - self.lookback..];
        let atr = average_true_range(recent, 14);
        let swings = find_swings(recent, atr * self.swing_sensitivity);

        let highs: Vec<&Swing> = swings.iter().filter(|s| s.kind == SwingKind::High).collect();
        let lows: Vec<&Swing> = swings.iter().filter(|s| s.kind == SwingKind::Low).collect();
        if highs.len() < 2 || lows.len() < 2 {
            return Err(FilterDecision::Block {
                reason: "not enough swing points for structure analysis".to_string(),
            });
        }

        let hh = highs[highs.len() - 1].price > highs[highs.len() - 2].price;
        let hl = lows[lows.len() - 1].price > lows[lows.len() - 2].price;
        let lh = highs[highs.len() - 1].price < highs[highs.len() - 2].price;
        let ll = lows[lows.len() - 1].price < lows[lows.len() - 2].price;

        if hh && hl {
            Ok(Bias::LongOnly)
        } else if lh && ll {
            Ok(Bias::ShortOnly)
        } else {
            Err(FilterDecision::Block {
                reason: format!("mixed structure: HH={hh} HL={hl} LH={lh} LL={ll}"),
            })
        }
    }
}

/// Swing highs/lows: a candle whose high (low) exceeds (undercuts) the two
/// candles on each side, kept only when it moved at least `min_move` from
/// the previous accepted swing.
fn find_swings(candles: &[Candle], min_move: Decimal) -> Vec<Swing> {
    let mut swings: Vec<Swing> = Vec::new();
    if candles.len() < 5 {
        return swings;
    }

    for i in 2..candles.len() - 2 {
        let high = candles[i].high;
        let low = candles[i].low;

        if high > candles[i - 1].high
            && high > candles[i - 2].high
            && high > candles[i + 1].high
            && high > candles[i + 2].high
        {
            let significant = swings
                .last()
                .map_or(true, |last| (high - last.price).abs() >= min_move);
            if significant {
                swings.push(Swing { kind: SwingKind::High, price: high });
            }
        }

        if low < candles[i - 1].low
            && low < candles[i - 2].low
            && low < candles[i + 1].low
            && low < candles[i + 2].low
        {
            let significant = swings
                .last()
                .map_or(true, |last| (low - last.price).abs() >= min_move);
            if significant {
                swings.push(Swing { kind: SwingKind::Low, price: low });
            }
        }
    }

    swings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(i: usize, high: Decimal, low: Decimal) -> Candle {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(15 * i as i64);
        let mid = (high + low) / dec!(2);
        Candle::new(ts, mid, high, low, mid, dec!(1))
    }

    /// Zigzag with two peaks and two valleys; `step` shifts each successive
    /// extreme up (positive) or down (negative).
    fn structured(step: Decimal) -> Vec<Candle> {
        let base = dec!(100);
        let mut candles = Vec::new();
        // Pattern of local extremes at indices 4, 9, 14, 19 inside padding.
        for i in 0..24usize {
            let (high, low) = match i {
                4 => (base + dec!(10), base + dec!(8)),                  // swing high 1
                9 => (base - dec!(8), base - dec!(10)),                  // swing low 1
                14 => (base + dec!(10) + step, base + dec!(8) + step),   // swing high 2
                19 => (base - dec!(8) + step, base - dec!(10) + step),   // swing low 2
                _ => (base + dec!(1), base - dec!(1)),
            };
            candles.push(candle(i, high, low));
        }
        candles
    }

    fn filter() -> BiasFilter {
        BiasFilter { enabled: true, lookback: 24, swing_sensitivity: dec!(0.5) }
    }

    #[test]
    fn rising_structure_is_long_only() {
        assert_eq!(filter().check(&structured(dec!(5))).unwrap(), Bias::LongOnly);
    }

    #[test]
    fn falling_structure_is_short_only() {
        assert_eq!(filter().check(&structured(dec!(-5))).unwrap(), Bias::ShortOnly);
    }

    #[test]
    fn flat_structure_blocks() {
        match filter().check(&structured(Decimal::ZERO)) {
            Err(FilterDecision::Block { reason }) => {
                assert!(reason.contains("structure") || reason.contains("swing"), "{reason}")
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn too_few_candles_blocks() {
        match filter().check(&structured(dec!(5))[..10]) {
            Err(FilterDecision::Block { reason }) => assert!(reason.contains("insufficient")),
            other => panic!("expected block, got {other:?}"),
        }
    }
}
