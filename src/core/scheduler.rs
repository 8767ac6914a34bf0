//! Cycle scheduler - the outer loop.
//!
//! One strictly sequential loop per process: wake, run a cycle, sleep.
//! A cycle is guard maintenance, observation, then either the monitoring
//! path (position open) or the entry path (flat), then store updates. There
//! is no second mutator anywhere, which is what keeps the exclusivity and
//! rate invariants trivial - no locks, just one loop.
//!
//! Every "wait N minutes" in the system is a timestamp comparison evaluated
//! when the loop next wakes; no timers run outside it. The stop signal is
//! honored between cycles, never mid-cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

use crate::comms::Notifier;
use crate::core::guard::{RiskGuard, Verdict};
use crate::core::orchestrator::Orchestrator;
use crate::core::position::{CloseTrigger, Lifecycle, MonitorOutcome, PendingOpen, State};
use crate::core::types::{Candle, DecisionRecord, Instruction, Side, TradeResult};
use crate::data::{MarketData, Timeframe};
use crate::error::CycleError;
use crate::exchange::Execution;
use crate::filters::{FilterPipeline, PipelineOutcome};

/// Candles fetched per cycle for the execution timeframe.
const EXEC_CANDLE_LIMIT: usize = 60;
/// Candles fetched per cycle for the bias timeframe.
const BIAS_CANDLE_LIMIT: usize = 40;

/// Stop/target magnitudes applied to a position adopted from the exchange
/// at startup, when the original levels are unrecoverable.
const RECOVERY_STOP_PCT: Decimal = dec!(2);
const RECOVERY_TARGET_PCT: Decimal = dec!(4);

pub struct SchedulerConfig {
    pub cycle_interval: std::time::Duration,
    pub execution_timeout: std::time::Duration,
}

pub struct Scheduler {
    config: SchedulerConfig,
    guard: RiskGuard,
    lifecycle: Lifecycle,
    pipeline: FilterPipeline,
    orchestrator: Orchestrator,
    exchange: Box<dyn Execution>,
    market: Box<dyn MarketData>,
    notifier: Notifier,
    /// UTC day the last daily summary covered
    summary_day: Option<chrono::NaiveDate>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        guard: RiskGuard,
        lifecycle: Lifecycle,
        pipeline: FilterPipeline,
        orchestrator: Orchestrator,
        exchange: Box<dyn Execution>,
        market: Box<dyn MarketData>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            guard,
            lifecycle,
            pipeline,
            orchestrator,
            exchange,
            market,
            notifier,
            summary_day: None,
        }
    }

    /// Reconcile the persisted position record against what the exchange
    /// actually holds. The exchange wins every disagreement: a record it
    /// does not back is dropped, a position it holds without a record is
    /// adopted with conservative recovery levels.
    pub async fn reconcile(&mut self, now: DateTime<Utc>) -> Result<(), CycleError> {
        let at_exchange = self.exchange.query_position().await?;
        match (at_exchange, self.lifecycle.position().cloned()) {
            (None, Some(stale)) => {
                warn!("dropping stale {} position record: exchange is flat", stale.side);
                self.lifecycle.forget()?;
            }
            (Some(held), None) => {
                warn!(
                    "adopting untracked {} position from exchange: {} @ {}",
                    held.side, held.size, held.entry_price
                );
                let (stop, target) = recovery_levels(held.side, held.entry_price);
                self.lifecycle
                    .adopt(now, held.side, held.size, held.entry_price, stop, target)?;
            }
            (Some(held), Some(recorded)) if held.side != recorded.side => {
                warn!(
                    "position record disagrees with exchange ({} vs {}), trusting exchange",
                    recorded.side, held.side
                );
                self.lifecycle.forget()?;
                let (stop, target) = recovery_levels(held.side, held.entry_price);
                self.lifecycle
                    .adopt(now, held.side, held.size, held.entry_price, stop, target)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Run until the stop future resolves. The signal is checked between
    /// cycles only, so no transition is ever left half applied.
    pub async fn run(&mut self, stop: impl std::future::Future<Output = ()>) {
        tokio::pin!(stop);
        loop {
            let now = Utc::now();
            if let Err(e) = self.run_cycle(now).await {
                error!("cycle failed: {e}");
                match &e {
                    CycleError::Execution(msg) => {
                        self.notifier.send_alert("execution", msg).await;
                    }
                    CycleError::Persistence(io) => {
                        self.notifier.send_alert("persistence", &io.to_string()).await;
                    }
                    CycleError::Oracle(_) => {}
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_interval) => {}
                _ = &mut stop => {
                    info!("stop signal received, exiting between cycles");
                    break;
                }
            }
        }
    }

    /// One full cycle at the given instant.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<(), CycleError> {
        self.guard.tick(now)?;
        self.daily_summary(now).await;

        let exec_candles = match self.market.candles(Timeframe::M5, EXEC_CANDLE_LIMIT).await {
            Ok(candles) if !candles.is_empty() => candles,
            Ok(_) => {
                warn!("no candles returned, degrading to no-op");
                self.orchestrator.record_hold(now, "market data unavailable")?;
                return Ok(());
            }
            Err(e) => {
                warn!("candle fetch failed, degrading to no-op: {e}");
                self.orchestrator.record_hold(now, "market data unavailable")?;
                return Ok(());
            }
        };
        let price = exec_candles.last().expect("candles non-empty").close;
        self.exchange.update_mark(price).await?;

        // A close that failed last cycle retries before anything else.
        if self.lifecycle.pending_close().is_some() {
            self.orchestrator.record_hold(now, "retrying pending close")?;
            return self.execute_close(now).await;
        }

        // An OPENING that survived to a new cycle never confirmed its fill;
        // revert and let this cycle re-evaluate from scratch.
        if matches!(self.lifecycle.state(), State::Opening(_)) {
            warn!("unconfirmed open from previous cycle, reverting to flat");
            self.lifecycle.abort_open();
        }

        if self.lifecycle.position().is_some() {
            self.monitor_path(now, &exec_candles, price).await
        } else {
            self.entry_path(now, &exec_candles, price).await
        }
    }

    async fn monitor_path(
        &mut self,
        now: DateTime<Utc>,
        exec_candles: &[Candle],
        price: Decimal,
    ) -> Result<(), CycleError> {
        // An active shutdown window force-closes whatever is still open.
        if self.guard.in_shutdown(now) {
            info!("shutdown window active, force-closing open position");
            self.orchestrator
                .record(now, &DecisionRecord::close("daily-loss shutdown"))?;
            self.lifecycle.begin_close(CloseTrigger::Shutdown);
            return self.execute_close(now).await;
        }

        // Objective price triggers come first and ignore the minimum hold.
        if let Some(trigger) = self.lifecycle.price_exit(price) {
            info!("price exit at {price}: {trigger}");
            self.orchestrator
                .record(now, &DecisionRecord::close(trigger.to_string()))?;
            self.lifecycle.begin_close(trigger);
            return self.execute_close(now).await;
        }

        let position = self
            .lifecycle
            .position()
            .cloned()
            .expect("monitor path requires a position");
        let action = self
            .orchestrator
            .monitor_cycle(now, exec_candles, &position)
            .await?;

        match self.lifecycle.apply_monitor(now, action) {
            MonitorOutcome::Hold => Ok(()),
            MonitorOutcome::HoldMinimum => {
                warn!(
                    "refusing to close - minimum hold not elapsed (until {})",
                    position.minimum_hold_until
                );
                Ok(())
            }
            MonitorOutcome::CloseAccepted => self.execute_close(now).await,
        }
    }

    async fn entry_path(
        &mut self,
        now: DateTime<Utc>,
        exec_candles: &[Candle],
        price: Decimal,
    ) -> Result<(), CycleError> {
        let bias_candles = match self.market.candles(Timeframe::M15, BIAS_CANDLE_LIMIT).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!("bias candle fetch failed, degrading to no-op: {e}");
                self.orchestrator.record_hold(now, "market data unavailable")?;
                return Ok(());
            }
        };

        let verdict = self.pipeline.evaluate(now, exec_candles, &bias_candles);
        let bias = match verdict.outcome {
            PipelineOutcome::Block { filter, reason } => {
                info!("cycle vetoed by {filter}: {reason}");
                self.orchestrator
                    .record_veto(now, &format!("{filter}: {reason}"))?;
                return Ok(());
            }
            PipelineOutcome::Pass { bias } => bias,
        };

        match self.guard.may_open(now, !self.lifecycle.is_flat()) {
            Verdict::Deny(reason) => {
                info!("cycle vetoed by guard: {reason}");
                self.orchestrator.record_veto(now, reason.as_str())?;
                return Ok(());
            }
            Verdict::Allow => {}
        }

        let equity = match self.exchange.equity().await {
            Ok(equity) => equity,
            Err(e) => {
                warn!("equity unavailable, degrading to no-op: {e}");
                self.orchestrator.record_hold(now, "equity unavailable")?;
                return Ok(());
            }
        };

        let (instruction, decision) = self
            .orchestrator
            .entry_cycle(now, exec_candles, equity, price)
            .await?;

        let (side, size, stop, target, max_slippage_pct) = match instruction {
            Instruction::Open { side, size, stop, target, max_slippage_pct, .. } => {
                (side, size, stop, target, max_slippage_pct)
            }
            Instruction::Hold { reason } => {
                info!("holding: {reason}");
                return Ok(());
            }
            Instruction::Malformed { .. } => {
                info!("malformed instruction, holding");
                return Ok(());
            }
            Instruction::Close { .. } => {
                // Nothing is open on the entry path; a close is a no-op.
                return Ok(());
            }
        };

        // Bias intersection: a conflicting proposal is a block, not an
        // override.
        if !bias.permits(side) {
            info!("proposed {side} conflicts with {bias} bias, blocked");
            return Ok(());
        }

        self.lifecycle.begin_open(PendingOpen { side, size, stop, target })?;
        info!("opening {side} size={size} stop={stop} target={target}");

        let fill = tokio::time::timeout(
            self.config.execution_timeout,
            self.exchange.open(side, size, stop, target, max_slippage_pct),
        )
        .await
        .map_err(|_| CycleError::Execution("open timed out".to_string()))
        .and_then(|r| r);

        let fill = match fill {
            Ok(fill) => fill,
            Err(e) => {
                // No silent retry of the same signal: revert to flat and let
                // the next cycle re-evaluate from scratch.
                warn!("open failed, reverting to flat: {e}");
                self.lifecycle.abort_open();
                self.notifier.send_alert("open failed", &e.to_string()).await;
                return Ok(());
            }
        };

        let position = self.lifecycle.confirm_open(now, fill.price)?.clone();
        self.guard.record_open(now)?;
        self.orchestrator.record_trade(
            now,
            decision,
            TradeResult {
                kind: "open".to_string(),
                side: Some(side),
                size: fill.size,
                pnl: None,
            },
            fill.price,
        )?;
        info!(
            "opened {} {} @ {} (hold until {})",
            side, fill.size, fill.price, position.minimum_hold_until
        );
        self.notifier
            .send_open(side, fill.size, fill.price, stop, target)
            .await;
        Ok(())
    }

    /// Once per UTC day, report the trailing window's tallies. The first
    /// cycle after startup only anchors the day; no summary for a day this
    /// process did not watch.
    async fn daily_summary(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        match self.summary_day {
            None => self.summary_day = Some(today),
            Some(day) if day != today => {
                self.summary_day = Some(today);
                match self.orchestrator.trade_stats(now) {
                    Ok(stats) => {
                        info!(
                            "daily summary: {} closed, {:.1}% win rate, pnl {}",
                            stats.closed,
                            stats.win_rate_pct(),
                            stats.total_pnl
                        );
                        self.notifier
                            .send_daily_summary(stats.closed, stats.win_rate_pct(), stats.total_pnl)
                            .await;
                    }
                    Err(e) => warn!("daily summary skipped: {e}"),
                }
            }
            Some(_) => {}
        }
    }

    /// Drive a pending close through the execution capability. Failure
    /// leaves the CLOSING state intact so the next tick retries; the
    /// position is never assumed to have vanished.
    async fn execute_close(&mut self, now: DateTime<Utc>) -> Result<(), CycleError> {
        let trigger = self
            .lifecycle
            .pending_close()
            .cloned()
            .expect("execute_close requires a pending close");

        let fill = tokio::time::timeout(
            self.config.execution_timeout,
            self.exchange.close(&trigger.to_string()),
        )
        .await
        .map_err(|_| CycleError::Execution("close timed out".to_string()))
        .and_then(|r| r);

        let fill = match fill {
            Ok(fill) => fill,
            Err(e) => {
                warn!("close failed, will retry next cycle: {e}");
                self.notifier.send_alert("close failed", &e.to_string()).await;
                return Ok(());
            }
        };

        let closed = self.lifecycle.confirm_close(fill.price)?;
        let pnl = fill.pnl.unwrap_or(closed.pnl);
        self.orchestrator.record_trade(
            now,
            DecisionRecord::close(trigger.to_string()),
            TradeResult {
                kind: "close".to_string(),
                side: Some(closed.position.side),
                size: closed.position.size,
                pnl: Some(pnl),
            },
            fill.price,
        )?;

        let effects = self.guard.record_close(now, pnl)?;
        info!("closed @ {} pnl={pnl} ({trigger})", fill.price);
        self.notifier.send_close(&trigger.to_string(), fill.price, pnl).await;

        if effects.pause_triggered {
            warn!("loss streak pause armed");
            self.notifier
                .send_pause_alert(self.guard.config().pause_duration.num_hours())
                .await;
        }
        if effects.shutdown_triggered {
            warn!("daily loss shutdown armed");
            self.notifier
                .send_shutdown_alert(
                    self.guard.state().daily_pnl,
                    self.guard.config().shutdown_duration.num_hours(),
                )
                .await;
        }
        Ok(())
    }
}

fn recovery_levels(side: Side, entry: Decimal) -> (Decimal, Decimal) {
    let sl = RECOVERY_STOP_PCT / dec!(100);
    let tp = RECOVERY_TARGET_PCT / dec!(100);
    match side {
        Side::Long => (entry * (Decimal::ONE - sl), entry * (Decimal::ONE + tp)),
        Side::Short => (entry * (Decimal::ONE + sl), entry * (Decimal::ONE - tp)),
    }
}
