//! Volatility gate - blocks trading in compressed conditions.
//!
//! Measures the current ATR against its recent average. When volatility is
//! compressed, spreads dominate, breakouts fail and pattern geometry stops
//! meaning anything, so the gate vetoes the cycle.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::FilterDecision;
use crate::core::types::Candle;

pub struct VolatilityGate {
    pub enabled: bool,
    pub atr_period: usize,
    /// Lookback for the ATR average, as a multiple of the ATR period
    pub lookback_multiplier: usize,
    /// Ratio of current to average ATR below which conditions are compressed
    pub compression_ratio: Decimal,
}

impl VolatilityGate {
    pub const NAME: &'static str = "volatility";

    pub fn check(&self, candles: &[Candle]) -> FilterDecision {
        let lookback = self.atr_period * self.lookback_multiplier;
        if candles.len() < lookback + self.atr_period {
            return FilterDecision::Block {
                reason: format!(
                    "insufficient data for volatility analysis ({} candles, need {})",
                    candles.len(),
                    lookback + self.atr_period
                ),
            };
        }

        let atr = atr_series(candles, self.atr_period);
        let current = *atr.last().expect("atr series non-empty");

        let window = &atr[atr.len() - lookback..];
        let average = window.iter().copied().sum::<Decimal>() / Decimal::from(window.len() as u64);
        if average.is_zero() {
            return FilterDecision::Block {
                reason: "volatility average is zero".to_string(),
            };
        }

        let ratio = current / average;
        if ratio < self.compression_ratio {
            FilterDecision::Block {
                reason: format!(
                    "volatility compressed: {:.0}% of average (threshold {:.0}%)",
                    ratio * dec!(100),
                    self.compression_ratio * dec!(100)
                ),
            }
        } else {
            FilterDecision::Pass
        }
    }
}

/// True range per candle: max(high-low, |high-prev_close|, |low-prev_close|).
fn true_ranges(candles: &[Candle]) -> Vec<Decimal> {
    let mut tr = Vec::with_capacity(candles.len());
    for (i, c) in candles.iter().enumerate() {
        if i == 0 {
            tr.push(c.range());
        } else {
            let prev_close = candles[i - 1].close;
            let hl = c.range();
            let hc = (c.high - prev_close).abs();
            let lc = (c.low - prev_close).abs();
            tr.push(hl.max(hc).max(lc));
        }
    }
    tr
}

/// Exponentially smoothed ATR series. Seeded with the simple mean of the
/// first `period` true ranges, then EMA-updated.
pub(crate) fn atr_series(candles: &[Candle], period: usize) -> Vec<Decimal> {
    let tr = true_ranges(candles);
    let mut atr = vec![Decimal::ZERO; candles.len()];
    if candles.len() < period {
        return atr;
    }

    let seed: Decimal = tr[..period].iter().copied().sum::<Decimal>() / Decimal::from(period as u64);
    atr[period - 1] = seed;

    let multiplier = dec!(2) / Decimal::from((period + 1) as u64);
    for i in period..candles.len() {
        atr[i] = tr[i] * multiplier + atr[i - 1] * (Decimal::ONE - multiplier);
    }
    atr
}

/// Simple mean of the most recent `period` true ranges. Used by the bias
/// filter for swing significance.
pub(crate) fn average_true_range(candles: &[Candle], period: usize) -> Decimal {
    let tr = true_ranges(candles);
    if tr.is_empty() {
        return Decimal::ZERO;
    }
    let tail = if tr.len() > period { &tr[tr.len() - period..] } else { &tr[..] };
    tail.iter().copied().sum::<Decimal>() / Decimal::from(tail.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candles_with_ranges(ranges: &[(Decimal, Decimal)]) -> Vec<Candle> {
        ranges
            .iter()
            .enumerate()
            .map(|(i, (high, low))| {
                let ts = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
                    + chrono::Duration::minutes(5 * i as i64);
                Candle::new(ts, dec!(100), *high, *low, dec!(100), dec!(1))
            })
            .collect()
    }

    fn gate() -> VolatilityGate {
        VolatilityGate {
            enabled: true,
            atr_period: 14,
            lookback_multiplier: 3,
            compression_ratio: dec!(0.75),
        }
    }

    #[test]
    fn insufficient_data_blocks() {
        let g = gate();
        let candles = candles_with_ranges(&vec![(dec!(101), dec!(99)); 10]);
        match g.check(&candles) {
            FilterDecision::Block { reason } => assert!(reason.contains("insufficient")),
            FilterDecision::Pass => panic!("expected block"),
        }
    }

    #[test]
    fn steady_volatility_passes() {
        let g = gate();
        let candles = candles_with_ranges(&vec![(dec!(101), dec!(99)); 60]);
        assert_eq!(g.check(&candles), FilterDecision::Pass);
    }

    #[test]
    fn collapse_in_range_blocks() {
        let g = gate();
        let mut ranges = vec![(dec!(110), dec!(90)); 50];
        ranges.extend(vec![(dec!(100.5), dec!(99.5)); 20]);
        let candles = candles_with_ranges(&ranges);
        match g.check(&candles) {
            FilterDecision::Block { reason } => assert!(reason.contains("compressed")),
            FilterDecision::Pass => panic!("expected block"),
        }
    }

    #[test]
    fn atr_series_constant_ranges() {
        let candles = candles_with_ranges(&vec![(dec!(101), dec!(99)); 30]);
        let atr = atr_series(&candles, 14);
        // With identical true ranges, the EMA stays at the range.
        assert_eq!(atr[13], dec!(2));
        assert_eq!(*atr.last().unwrap(), dec!(2));
    }

    #[test]
    fn true_range_uses_prior_close_gap() {
        // Gap up: high-low is 2 but high-prev_close is 12.
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let candles = vec![
            Candle::new(ts, dec!(100), dec!(101), dec!(99), dec!(100), dec!(1)),
            Candle::new(ts, dec!(111), dec!(112), dec!(110), dec!(111), dec!(1)),
        ];
        let tr = true_ranges(&candles);
        assert_eq!(tr[1], dec!(12));
    }
}
