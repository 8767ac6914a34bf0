//! Position lifecycle state machine.
//!
//! Governs the single position from entry to exit:
//! FLAT -> OPENING -> OPEN -> CLOSING -> FLAT.
//!
//! Invariants enforced here:
//! - at most one position exists, ever;
//! - no discretionary close before `minimum_hold_until`, regardless of what
//!   the oracle says (stop/target touches are exempt - objective price
//!   triggers always close);
//! - a side flip is not a legal monitoring input, so a position's side is
//!   immutable for its lifetime;
//! - an unconfirmed open reverts to flat, an unconfirmed close stays in
//!   CLOSING and retries next tick.
//!
//! The current position record is persisted through a [`StateFile`] so a
//! restart resumes monitoring instead of forgetting the exposure.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::types::{MonitorAction, Position, Side};
use crate::error::CycleError;
use crate::store::StateFile;

/// Why a close was initiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseTrigger {
    StopLoss,
    TakeProfit,
    /// Discretionary close with the oracle's reversal justification
    Reversal(String),
    /// Daily-loss shutdown force-close
    Shutdown,
}

impl std::fmt::Display for CloseTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseTrigger::StopLoss => write!(f, "stop-loss touched"),
            CloseTrigger::TakeProfit => write!(f, "take-profit touched"),
            CloseTrigger::Reversal(reason) => write!(f, "reversal: {reason}"),
            CloseTrigger::Shutdown => write!(f, "daily-loss shutdown"),
        }
    }
}

/// Parameters of an entry awaiting its fill confirmation.
#[derive(Debug, Clone)]
pub struct PendingOpen {
    pub side: Side,
    pub size: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
}

#[derive(Debug, Clone)]
pub enum State {
    Flat,
    Opening(PendingOpen),
    Open(Position),
    Closing { position: Position, trigger: CloseTrigger },
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Flat => "FLAT",
            State::Opening(_) => "OPENING",
            State::Open(_) => "OPEN",
            State::Closing { .. } => "CLOSING",
        }
    }
}

/// Outcome of applying a monitor instruction to an open position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Hold,
    /// A close instruction arrived before the minimum hold elapsed and was
    /// overridden to hold.
    HoldMinimum,
    CloseAccepted,
}

pub struct Lifecycle {
    state: State,
    minimum_hold: Duration,
    file: StateFile<Position>,
}

impl Lifecycle {
    /// Restore from the persisted position record, if one exists.
    pub fn load(minimum_hold: Duration, file: StateFile<Position>) -> Self {
        let state = match file.load().ok().flatten() {
            Some(position) => State::Open(position),
            None => State::Flat,
        };
        Self { state, minimum_hold, file }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn position(&self) -> Option<&Position> {
        match &self.state {
            State::Open(p) | State::Closing { position: p, .. } => Some(p),
            _ => None,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, State::Flat)
    }

    /// FLAT -> OPENING. Only legal when flat; the exclusivity invariant is a
    /// state-machine rule, not a counter.
    pub fn begin_open(&mut self, pending: PendingOpen) -> Result<(), CycleError> {
        match self.state {
            State::Flat => {
                self.state = State::Opening(pending);
                Ok(())
            }
            _ => Err(CycleError::Execution(format!(
                "cannot open from {}",
                self.state.name()
            ))),
        }
    }

    /// OPENING -> OPEN on a confirmed fill. The position record is persisted
    /// before the transition commits.
    pub fn confirm_open(
        &mut self,
        now: DateTime<Utc>,
        fill_price: Decimal,
    ) -> Result<&Position, CycleError> {
        let pending = match &self.state {
            State::Opening(p) => p.clone(),
            _ => {
                return Err(CycleError::Execution(format!(
                    "no pending open in {}",
                    self.state.name()
                )))
            }
        };

        let position = Position {
            side: pending.side,
            entry_price: fill_price,
            size: pending.size,
            stop_loss: pending.stop,
            take_profit: pending.target,
            opened_at: now,
            minimum_hold_until: now + self.minimum_hold,
        };
        self.file.write(&position)?;
        self.state = State::Open(position);
        match &self.state {
            State::Open(p) => Ok(p),
            _ => unreachable!(),
        }
    }

    /// OPENING -> FLAT when the fill never confirmed. The next cycle
    /// re-evaluates from scratch; the failed signal is not retried.
    pub fn abort_open(&mut self) {
        if matches!(self.state, State::Opening(_)) {
            self.state = State::Flat;
        }
    }

    /// Objective price triggers, checked before any oracle consultation.
    /// These close even inside the minimum-hold window.
    pub fn price_exit(&self, price: Decimal) -> Option<CloseTrigger> {
        let position = match &self.state {
            State::Open(p) => p,
            _ => return None,
        };
        if position.stop_touched(price) {
            Some(CloseTrigger::StopLoss)
        } else if position.target_touched(price) {
            Some(CloseTrigger::TakeProfit)
        } else {
            None
        }
    }

    /// Apply the oracle's monitoring verdict. Closes are overridden to hold
    /// until the minimum hold elapses; this is unconditional.
    pub fn apply_monitor(&mut self, now: DateTime<Utc>, action: MonitorAction) -> MonitorOutcome {
        let position = match &self.state {
            State::Open(p) => p.clone(),
            _ => return MonitorOutcome::Hold,
        };

        match action {
            MonitorAction::Hold => MonitorOutcome::Hold,
            MonitorAction::Close { .. } if now < position.minimum_hold_until => {
                MonitorOutcome::HoldMinimum
            }
            MonitorAction::Close { reason } => {
                self.state = State::Closing {
                    position,
                    trigger: CloseTrigger::Reversal(reason),
                };
                MonitorOutcome::CloseAccepted
            }
        }
    }

    /// OPEN -> CLOSING for a non-discretionary trigger (price exit or
    /// shutdown force-close).
    pub fn begin_close(&mut self, trigger: CloseTrigger) {
        if let State::Open(position) = &self.state {
            self.state = State::Closing { position: position.clone(), trigger };
        }
    }

    /// CLOSING -> FLAT once the close fill confirms. Clears the persisted
    /// record; realized PnL is computed against the entry.
    pub fn confirm_close(&mut self, exit_price: Decimal) -> Result<ClosedTrade, CycleError> {
        let (position, trigger) = match &self.state {
            State::Closing { position, trigger } => (position.clone(), trigger.clone()),
            _ => {
                return Err(CycleError::Execution(format!(
                    "no pending close in {}",
                    self.state.name()
                )))
            }
        };

        self.file.clear()?;
        self.state = State::Flat;

        let direction = match position.side {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        };
        let pnl = (exit_price - position.entry_price) * position.size * direction;
        Ok(ClosedTrade { position, trigger, exit_price, pnl })
    }

    /// A failed close keeps the CLOSING state; the scheduler retries the
    /// close on its next tick rather than assuming the position vanished.
    pub fn pending_close(&self) -> Option<&CloseTrigger> {
        match &self.state {
            State::Closing { trigger, .. } => Some(trigger),
            _ => None,
        }
    }

    /// Adopt a position found at the exchange during startup reconciliation
    /// (crash between fill confirmation and persistence). The minimum hold
    /// is re-anchored at adoption time.
    pub fn adopt(
        &mut self,
        now: DateTime<Utc>,
        side: Side,
        size: Decimal,
        entry_price: Decimal,
        stop: Decimal,
        target: Decimal,
    ) -> Result<&Position, CycleError> {
        let position = Position {
            side,
            entry_price,
            size,
            stop_loss: stop,
            take_profit: target,
            opened_at: now,
            minimum_hold_until: now + self.minimum_hold,
        };
        self.file.write(&position)?;
        self.state = State::Open(position);
        match &self.state {
            State::Open(p) => Ok(p),
            _ => unreachable!(),
        }
    }

    /// Drop a persisted record the exchange no longer knows about.
    pub fn forget(&mut self) -> Result<(), CycleError> {
        self.file.clear()?;
        self.state = State::Flat;
        Ok(())
    }
}

/// Everything the guard and the trade log need about a finished trade.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub position: Position,
    pub trigger: CloseTrigger,
    pub exit_price: Decimal,
    pub pnl: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn lifecycle(dir: &TempDir) -> Lifecycle {
        Lifecycle::load(
            Duration::minutes(15),
            StateFile::new(dir.path().join("position.json")),
        )
    }

    fn pending_long() -> PendingOpen {
        PendingOpen {
            side: Side::Long,
            size: dec!(2),
            stop: dec!(2450),
            target: dec!(2600),
        }
    }

    fn open_long(lc: &mut Lifecycle) {
        lc.begin_open(pending_long()).unwrap();
        lc.confirm_open(at(0), dec!(2500)).unwrap();
    }

    #[test]
    fn full_open_close_cycle() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        assert!(lc.is_flat());

        open_long(&mut lc);
        let pos = lc.position().unwrap();
        assert_eq!(pos.entry_price, dec!(2500));
        assert_eq!(pos.minimum_hold_until, at(15));

        let outcome = lc.apply_monitor(
            at(20),
            MonitorAction::Close { reason: "structure broke".to_string() },
        );
        assert_eq!(outcome, MonitorOutcome::CloseAccepted);

        let closed = lc.confirm_close(dec!(2550)).unwrap();
        assert_eq!(closed.pnl, dec!(100));
        assert!(lc.is_flat());
    }

    #[test]
    fn close_refused_before_minimum_hold() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        open_long(&mut lc);

        // Close at T+5 with a 15-minute hold: overridden to hold.
        let outcome = lc.apply_monitor(
            at(5),
            MonitorAction::Close { reason: "nervous".to_string() },
        );
        assert_eq!(outcome, MonitorOutcome::HoldMinimum);
        assert_eq!(lc.state().name(), "OPEN");

        // The identical instruction at T+16 is accepted.
        let outcome = lc.apply_monitor(
            at(16),
            MonitorAction::Close { reason: "nervous".to_string() },
        );
        assert_eq!(outcome, MonitorOutcome::CloseAccepted);
    }

    #[test]
    fn stop_touch_closes_inside_minimum_hold() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        open_long(&mut lc);

        // Price triggers are exempt from the hold window.
        assert_eq!(lc.price_exit(dec!(2449)), Some(CloseTrigger::StopLoss));
        assert_eq!(lc.price_exit(dec!(2601)), Some(CloseTrigger::TakeProfit));
        assert_eq!(lc.price_exit(dec!(2500)), None);
    }

    #[test]
    fn second_open_is_illegal() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        open_long(&mut lc);
        assert!(lc.begin_open(pending_long()).is_err());
    }

    #[test]
    fn aborted_open_reverts_to_flat() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        lc.begin_open(pending_long()).unwrap();
        lc.abort_open();
        assert!(lc.is_flat());
        assert!(lc.position().is_none());
    }

    #[test]
    fn failed_close_stays_pending_for_retry() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        open_long(&mut lc);
        lc.begin_close(CloseTrigger::StopLoss);

        // No confirm: state remains CLOSING with the trigger intact.
        assert_eq!(lc.pending_close(), Some(&CloseTrigger::StopLoss));
        assert_eq!(lc.state().name(), "CLOSING");

        let closed = lc.confirm_close(dec!(2450)).unwrap();
        assert_eq!(closed.pnl, dec!(-100));
        assert!(lc.is_flat());
    }

    #[test]
    fn repeated_holds_do_not_mutate_state() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        open_long(&mut lc);
        let before = lc.position().unwrap().clone();

        for _ in 0..5 {
            assert_eq!(lc.apply_monitor(at(30), MonitorAction::Hold), MonitorOutcome::Hold);
        }
        let after = lc.position().unwrap();
        assert_eq!(after.entry_price, before.entry_price);
        assert_eq!(after.minimum_hold_until, before.minimum_hold_until);
        assert_eq!(lc.state().name(), "OPEN");
    }

    #[test]
    fn position_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let mut lc = lifecycle(&dir);
            open_long(&mut lc);
        }
        let lc = lifecycle(&dir);
        let pos = lc.position().unwrap();
        assert_eq!(pos.side, Side::Long);
        assert_eq!(pos.entry_price, dec!(2500));
    }

    #[test]
    fn short_pnl_sign() {
        let dir = TempDir::new().unwrap();
        let mut lc = lifecycle(&dir);
        lc.begin_open(PendingOpen {
            side: Side::Short,
            size: dec!(1),
            stop: dec!(2550),
            target: dec!(2400),
        })
        .unwrap();
        lc.confirm_open(at(0), dec!(2500)).unwrap();
        lc.begin_close(CloseTrigger::TakeProfit);
        let closed = lc.confirm_close(dec!(2400)).unwrap();
        assert_eq!(closed.pnl, dec!(100));
    }
}
