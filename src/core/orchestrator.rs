//! Decision orchestrator.
//!
//! Assembles cycle context, routes it to the right oracle call (entry
//! proposal when flat, monitor verdict when a position is open), and
//! normalizes whatever comes back into the closed instruction set. The
//! orchestrator is the only writer into the decision history and the trade
//! log; every cycle leaves exactly one decision record behind, veto cycles
//! included.
//!
//! Absence of a confident, well-formed instruction never changes position
//! state: oracle failures, timeouts and malformed responses all normalize
//! to hold.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::core::stats::TradeStats;
use crate::core::types::{
    Candle, DecisionRecord, Instruction, MonitorAction, Position, Side, TradeRecord, TradeResult,
};
use crate::error::CycleError;
use crate::oracle::parse::{self, ParsedEntry, ParsedMonitor, ParsedRisk};
use crate::oracle::{EntryContext, EntryProposal, MonitorContext, Oracle, RiskParams};
use crate::store::{HistoryStore, TradeLog};

/// How much decision history rides along as oracle context.
const CONTEXT_WINDOW_HOURS: i64 = 3;

pub struct Orchestrator {
    oracle: Box<dyn Oracle>,
    history: HistoryStore,
    trade_log: TradeLog,
    oracle_timeout: std::time::Duration,
    max_position_fraction: Decimal,
}

impl Orchestrator {
    pub fn new(
        oracle: Box<dyn Oracle>,
        history: HistoryStore,
        trade_log: TradeLog,
        oracle_timeout: std::time::Duration,
        max_position_fraction: Decimal,
    ) -> Self {
        Self {
            oracle,
            history,
            trade_log,
            oracle_timeout,
            max_position_fraction,
        }
    }

    /// Entry cycle: propose, validate, normalize. Returns the instruction
    /// and the decision record already written for this cycle.
    pub async fn entry_cycle(
        &self,
        now: DateTime<Utc>,
        candles: &[Candle],
        equity: Decimal,
        price: Decimal,
    ) -> Result<(Instruction, DecisionRecord), CycleError> {
        let recent = self
            .history
            .read_window(now, Duration::hours(CONTEXT_WINDOW_HOURS))?;
        let ctx = EntryContext { candles, recent_decisions: &recent };

        let (instruction, record) = self.build_entry_instruction(&ctx, equity, price).await;
        self.history.append(now, &record)?;
        Ok((instruction, record))
    }

    async fn build_entry_instruction(
        &self,
        ctx: &EntryContext<'_>,
        equity: Decimal,
        price: Decimal,
    ) -> (Instruction, DecisionRecord) {
        let text = match self.call(self.oracle.entry_text(ctx)).await {
            Ok(text) => text,
            Err(e) => {
                warn!("entry oracle degraded to hold: {e}");
                return hold(format!("oracle unavailable: {e}"));
            }
        };

        let proposal = match parse::parse_entry(&text) {
            ParsedEntry::Proposal(p) => p,
            ParsedEntry::Malformed(raw) => {
                warn!("malformed entry response treated as hold");
                return malformed(raw);
            }
        };

        let side = match proposal.side.direction() {
            Some(side) => side,
            None => {
                return hold(if proposal.reason.is_empty() {
                    "oracle proposes flat".to_string()
                } else {
                    proposal.reason.clone()
                })
            }
        };

        let fraction = proposal.position_fraction.min(self.max_position_fraction);
        if fraction <= Decimal::ZERO {
            return hold("proposed size is zero".to_string());
        }

        // Validating second oracle prices the proposal.
        let risk = match self.call(self.oracle.risk_text(ctx, &proposal)).await {
            Ok(text) => match parse::parse_risk(&text) {
                ParsedRisk::Params(params) => params,
                ParsedRisk::Malformed(raw) => {
                    warn!("malformed risk response treated as hold");
                    return malformed(raw);
                }
            },
            Err(e) => {
                warn!("risk oracle degraded to hold: {e}");
                return hold(format!("risk oracle unavailable: {e}"));
            }
        };

        if risk.stop_loss_pct <= Decimal::ZERO || risk.take_profit_pct <= Decimal::ZERO {
            warn!("non-positive risk parameters treated as hold");
            return hold("unusable risk parameters".to_string());
        }

        let (stop, target) = stop_target_prices(side, price, &risk);
        let record = DecisionRecord {
            action: match side {
                Side::Long => "long".to_string(),
                Side::Short => "short".to_string(),
            },
            pattern: Some(proposal.pattern.clone()),
            reason: proposal.reason.clone(),
            stop_loss_pct: Some(risk.stop_loss_pct),
            take_profit_pct: Some(risk.take_profit_pct),
            max_slippage_pct: Some(risk.max_slippage_pct),
        };
        let instruction = Instruction::Open {
            side,
            size: equity * fraction / price,
            stop,
            target,
            max_slippage_pct: risk.max_slippage_pct,
            pattern: proposal.pattern,
            reason: proposal.reason,
        };
        (instruction, record)
    }

    /// Monitor cycle: hold or close, nothing else can come back. Writes the
    /// cycle's decision record.
    pub async fn monitor_cycle(
        &self,
        now: DateTime<Utc>,
        candles: &[Candle],
        position: &Position,
    ) -> Result<MonitorAction, CycleError> {
        let ctx = MonitorContext { candles, position };

        let action = match self.call(self.oracle.monitor_text(&ctx)).await {
            Ok(text) => match parse::parse_monitor(&text) {
                ParsedMonitor::Action(action) => action,
                ParsedMonitor::Malformed(_) => {
                    warn!("malformed monitor response treated as hold");
                    MonitorAction::Hold
                }
            },
            Err(e) => {
                warn!("monitor oracle degraded to hold: {e}");
                MonitorAction::Hold
            }
        };

        let record = match &action {
            MonitorAction::Hold => DecisionRecord::hold("monitor: hold"),
            MonitorAction::Close { reason } => DecisionRecord::close(reason.clone()),
        };
        self.history.append(now, &record)?;
        Ok(action)
    }

    /// Append an arbitrary decision record for this cycle.
    pub fn record(&self, now: DateTime<Utc>, record: &DecisionRecord) -> Result<(), CycleError> {
        self.history.append(now, record)?;
        Ok(())
    }

    /// Record a vetoed cycle (filter block or guard denial). No oracle call
    /// was made; the veto itself is the cycle's decision.
    pub fn record_veto(
        &self,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<DecisionRecord, CycleError> {
        let record = DecisionRecord::veto(reason);
        self.history.append(now, &record)?;
        Ok(record)
    }

    /// Record a cycle that produced no oracle consultation for operational
    /// reasons (market data unavailable, close retry pending).
    pub fn record_hold(
        &self,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<DecisionRecord, CycleError> {
        let record = DecisionRecord::hold(reason);
        self.history.append(now, &record)?;
        Ok(record)
    }

    /// Win/loss tallies over the trade log's retention window.
    pub fn trade_stats(&self, now: DateTime<Utc>) -> Result<TradeStats, CycleError> {
        let trades = self.trade_log.read_window(now, Duration::hours(24))?;
        Ok(TradeStats::from_trades(&trades))
    }

    /// Append to the trade log; one entry per executed open or close.
    pub fn record_trade(
        &self,
        now: DateTime<Utc>,
        decision: DecisionRecord,
        result: TradeResult,
        price: Decimal,
    ) -> Result<(), CycleError> {
        self.trade_log
            .append(now, &TradeRecord { decision, result, price })?;
        Ok(())
    }

    async fn call<F>(&self, fut: F) -> Result<String, CycleError>
    where
        F: std::future::Future<Output = Result<String, CycleError>>,
    {
        match tokio::time::timeout(self.oracle_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CycleError::Oracle("timed out".to_string())),
        }
    }
}

fn hold(reason: String) -> (Instruction, DecisionRecord) {
    let record = DecisionRecord::hold(reason.clone());
    (Instruction::Hold { reason }, record)
}

fn malformed(raw: String) -> (Instruction, DecisionRecord) {
    let record = DecisionRecord {
        action: "malformed".to_string(),
        pattern: None,
        reason: raw.clone(),
        stop_loss_pct: None,
        take_profit_pct: None,
        max_slippage_pct: None,
    };
    (Instruction::Malformed { raw }, record)
}

/// Convert percentage magnitudes into absolute stop/target levels around
/// the current price, oriented by side.
fn stop_target_prices(side: Side, price: Decimal, risk: &RiskParams) -> (Decimal, Decimal) {
    let sl = risk.stop_loss_pct / dec!(100);
    let tp = risk.take_profit_pct / dec!(100);
    match side {
        Side::Long => (price * (Decimal::ONE - sl), price * (Decimal::ONE + tp)),
        Side::Short => (price * (Decimal::ONE + sl), price * (Decimal::ONE - tp)),
    }
}
