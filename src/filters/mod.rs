//! Admission filter pipeline.
//!
//! Ordered, independent gates that may veto a cycle before any oracle call
//! is made: time-of-day, volatility compression, multi-timeframe bias. The
//! pipeline short-circuits on the first block, so later filters are not
//! evaluated at all (and produce no trace output) once one has vetoed.
//!
//! Each filter is a pure predicate over the cycle context and reports a
//! structured reason when it blocks. A block is an ordinary outcome, not an
//! error.

pub mod bias;
pub mod time_of_day;
pub mod volatility;

pub use bias::BiasFilter;
pub use time_of_day::TimeOfDayFilter;
pub use volatility::VolatilityGate;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::types::{Bias, Candle};

/// A single filter's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Pass,
    Block { reason: String },
}

/// Pipeline result. `evaluated` lists the filters that actually ran, in
/// order - the short-circuit is observable here as well as in the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineVerdict {
    pub evaluated: Vec<&'static str>,
    pub outcome: PipelineOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All enabled filters passed; entries must respect the bias.
    Pass { bias: Bias },
    Block { filter: &'static str, reason: String },
}

pub struct FilterPipeline {
    pub time: TimeOfDayFilter,
    pub volatility: VolatilityGate,
    pub bias: BiasFilter,
}

impl FilterPipeline {
    /// Run the gates in fixed order: time-of-day, volatility, bias.
    /// Disabled filters are skipped without being counted as evaluated.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        exec_candles: &[Candle],
        bias_candles: &[Candle],
    ) -> PipelineVerdict {
        let mut evaluated = Vec::new();

        if self.time.enabled {
            evaluated.push(TimeOfDayFilter::NAME);
            match self.time.check(now) {
                FilterDecision::Pass => debug!("filter {} passed", TimeOfDayFilter::NAME),
                FilterDecision::Block { reason } => {
                    return PipelineVerdict {
                        evaluated,
                        outcome: PipelineOutcome::Block { filter: TimeOfDayFilter::NAME, reason },
                    }
                }
            }
        }

        if self.volatility.enabled {
            evaluated.push(VolatilityGate::NAME);
            match self.volatility.check(exec_candles) {
                FilterDecision::Pass => debug!("filter {} passed", VolatilityGate::NAME),
                FilterDecision::Block { reason } => {
                    return PipelineVerdict {
                        evaluated,
                        outcome: PipelineOutcome::Block { filter: VolatilityGate::NAME, reason },
                    }
                }
            }
        }

        let bias = if self.bias.enabled {
            evaluated.push(BiasFilter::NAME);
            match self.bias.check(bias_candles) {
                Ok(bias) => {
                    debug!("filter {} passed: {}", BiasFilter::NAME, bias);
                    bias
                }
                Err(FilterDecision::Block { reason }) => {
                    return PipelineVerdict {
                        evaluated,
                        outcome: PipelineOutcome::Block { filter: BiasFilter::NAME, reason },
                    }
                }
                Err(FilterDecision::Pass) => unreachable!(),
            }
        } else {
            Bias::Unconstrained
        };

        PipelineVerdict { evaluated, outcome: PipelineOutcome::Pass { bias } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use rust_decimal_macros::dec;

    fn flat_candles(n: usize) -> Vec<Candle> {
        // Constant-range candles: ATR ratio is exactly 1, never compressed.
        (0..n)
            .map(|i| {
                let ts = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
                    + chrono::Duration::minutes(5 * i as i64);
                Candle::new(ts, dec!(100), dec!(101), dec!(99), dec!(100), dec!(10))
            })
            .collect()
    }

    fn pipeline() -> FilterPipeline {
        FilterPipeline {
            time: TimeOfDayFilter {
                enabled: true,
                blocked_windows: vec![(
                    NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
                    NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
                )],
            },
            volatility: VolatilityGate {
                enabled: true,
                atr_period: 14,
                lookback_multiplier: 3,
                compression_ratio: dec!(0.75),
            },
            bias: BiasFilter { enabled: false, lookback: 20, swing_sensitivity: dec!(0.5) },
        }
    }

    #[test]
    fn time_block_short_circuits() {
        let p = pipeline();
        let noon = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let verdict = p.evaluate(noon, &flat_candles(60), &[]);

        // Only the first filter ran; volatility and bias were never touched.
        assert_eq!(verdict.evaluated, vec![TimeOfDayFilter::NAME]);
        match verdict.outcome {
            PipelineOutcome::Block { filter, .. } => assert_eq!(filter, TimeOfDayFilter::NAME),
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn all_pass_yields_bias() {
        let p = pipeline();
        let evening = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let verdict = p.evaluate(evening, &flat_candles(60), &[]);

        assert_eq!(
            verdict.evaluated,
            vec![TimeOfDayFilter::NAME, VolatilityGate::NAME]
        );
        assert_eq!(
            verdict.outcome,
            PipelineOutcome::Pass { bias: Bias::Unconstrained }
        );
    }

    #[test]
    fn disabled_filters_are_skipped() {
        let mut p = pipeline();
        p.time.enabled = false;
        p.volatility.enabled = false;
        let noon = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let verdict = p.evaluate(noon, &[], &[]);
        assert!(verdict.evaluated.is_empty());
        assert!(matches!(verdict.outcome, PipelineOutcome::Pass { .. }));
    }

    #[test]
    fn volatility_block_stops_before_bias() {
        let mut p = pipeline();
        p.bias.enabled = true;
        let evening = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();

        // Too few candles: the gate blocks with its insufficient-data reason.
        let verdict = p.evaluate(evening, &flat_candles(5), &flat_candles(30));
        assert_eq!(
            verdict.evaluated,
            vec![TimeOfDayFilter::NAME, VolatilityGate::NAME]
        );
        assert!(matches!(
            verdict.outcome,
            PipelineOutcome::Block { filter: "volatility", .. }
        ));
    }

    #[test]
    fn compressed_volatility_blocks() {
        let p = pipeline();
        let evening = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();

        // Wide ranges early, then a tight tail: the current ATR collapses
        // against the lookback average.
        let mut candles = Vec::new();
        for i in 0..70usize {
            let ts = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(5 * i as i64);
            let (high, low) = if i < 50 { (dec!(110), dec!(90)) } else { (dec!(100.5), dec!(99.5)) };
            candles.push(Candle::new(ts, dec!(100), high, low, dec!(100), dec!(10)));
        }

        let verdict = p.evaluate(evening, &candles, &[]);
        match verdict.outcome {
            PipelineOutcome::Block { filter, reason } => {
                assert_eq!(filter, VolatilityGate::NAME);
                assert!(reason.contains("compressed"), "reason: {reason}");
            }
            other => panic!("expected compression block, got {other:?}"),
        }
    }
}
