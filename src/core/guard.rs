//! Risk guard - account protection layer.
//!
//! The single source of truth for "is a new open allowed right now".
//! Strategy opinions come from the oracle; risk limits are ENFORCED here.
//! No entry passes without the guard's approval.
//!
//! Every mutation persists the counters before committing them in memory,
//! so a restart mid-window resumes the same pause, shutdown and rate state
//! instead of silently re-arming the controls.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CycleError;
use crate::store::StateFile;

/// Risk configuration (these ARE parameters - but for protection, not strategy)
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Max opens in any trailing 60-minute window
    pub max_opens_per_hour: usize,
    /// Wait after the last trade event before the next open
    pub cooldown: Duration,
    /// Consecutive losing closes that trigger a pause
    pub loss_streak_threshold: u32,
    /// How long a loss-streak pause lasts
    pub pause_duration: Duration,
    /// Fraction of starting equity lost in one UTC day that shuts trading down
    pub daily_loss_fraction: Decimal,
    /// How long a daily-loss shutdown lasts
    pub shutdown_duration: Duration,
    /// Equity baseline for the daily-loss fraction
    pub starting_equity: Decimal,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_opens_per_hour: 2,
            cooldown: Duration::minutes(30),
            loss_streak_threshold: 3,
            pause_duration: Duration::hours(24),
            daily_loss_fraction: dec!(0.06),
            shutdown_duration: Duration::hours(24),
            starting_equity: dec!(10000),
        }
    }
}

/// Persisted guard counters. Mutated only through [`RiskGuard`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    /// Timestamps of opens in the trailing hour, pruned lazily
    pub opens: Vec<DateTime<Utc>>,
    /// Last trade event (open or close), for the cooldown timer
    pub last_trade_at: Option<DateTime<Utc>>,
    pub consecutive_losses: u32,
    pub pause_until: Option<DateTime<Utc>>,
    pub shutdown_until: Option<DateTime<Utc>>,
    /// UTC day the daily PnL total belongs to
    pub day: NaiveDate,
    /// Cumulative realized PnL for that day
    pub daily_pnl: Decimal,
}

impl RiskState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            opens: Vec::new(),
            last_trade_at: None,
            consecutive_losses: 0,
            pause_until: None,
            shutdown_until: None,
            day,
            daily_pnl: Decimal::ZERO,
        }
    }
}

/// Why `may_open` said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    DailyLossShutdown,
    LossStreakPause,
    PositionOpen,
    RateLimit,
    Cooldown,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::DailyLossShutdown => "daily-loss-shutdown",
            DenyReason::LossStreakPause => "loss-streak-pause",
            DenyReason::PositionOpen => "position-open",
            DenyReason::RateLimit => "rate-limit",
            DenyReason::Cooldown => "cooldown",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

/// What a recorded close tripped, so the caller can alert and force-close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseEffects {
    pub shutdown_triggered: bool,
    pub pause_triggered: bool,
}

pub struct RiskGuard {
    config: GuardConfig,
    state: RiskState,
    file: StateFile<RiskState>,
}

impl RiskGuard {
    /// Load persisted counters, or seed fresh ones for today.
    pub fn load(config: GuardConfig, file: StateFile<RiskState>, now: DateTime<Utc>) -> Self {
        let state = file
            .load()
            .ok()
            .flatten()
            .unwrap_or_else(|| RiskState::fresh(now.date_naive()));
        Self { config, state, file }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn in_shutdown(&self, now: DateTime<Utc>) -> bool {
        self.state.shutdown_until.is_some_and(|until| now < until)
    }

    /// Elapsed-time maintenance: clear expired pause/shutdown windows and
    /// reset the daily total at UTC midnight. Persists only when something
    /// actually changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<(), CycleError> {
        let mut next = self.state.clone();
        let mut changed = false;

        if next.pause_until.is_some_and(|until| now >= until) {
            next.pause_until = None;
            changed = true;
        }
        if next.shutdown_until.is_some_and(|until| now >= until) {
            next.shutdown_until = None;
            changed = true;
        }
        let today = now.date_naive();
        if next.day != today {
            next.day = today;
            next.daily_pnl = Decimal::ZERO;
            changed = true;
        }

        if changed {
            self.commit(next)?;
        }
        Ok(())
    }

    /// Evaluate the entry gate. Rules run in fixed precedence: shutdown,
    /// pause, position exclusivity, rate ceiling, cooldown.
    pub fn may_open(&mut self, now: DateTime<Utc>, position_open: bool) -> Verdict {
        if self.state.shutdown_until.is_some_and(|until| now < until) {
            return Verdict::Deny(DenyReason::DailyLossShutdown);
        }
        if self.state.pause_until.is_some_and(|until| now < until) {
            return Verdict::Deny(DenyReason::LossStreakPause);
        }
        if position_open {
            return Verdict::Deny(DenyReason::PositionOpen);
        }

        self.state.opens.retain(|t| now - *t < Duration::hours(1));
        if self.state.opens.len() >= self.config.max_opens_per_hour {
            return Verdict::Deny(DenyReason::RateLimit);
        }

        if let Some(last) = self.state.last_trade_at {
            if now - last < self.config.cooldown {
                return Verdict::Deny(DenyReason::Cooldown);
            }
        }

        Verdict::Allow
    }

    /// Record a confirmed open.
    pub fn record_open(&mut self, now: DateTime<Utc>) -> Result<(), CycleError> {
        let mut next = self.state.clone();
        next.opens.retain(|t| now - *t < Duration::hours(1));
        next.opens.push(now);
        next.last_trade_at = Some(now);
        self.commit(next)
    }

    /// Record a closed trade's realized PnL and apply the loss rules.
    ///
    /// A losing close extends the streak; reaching the threshold sets the
    /// pause window and resets the counter. The day's cumulative loss
    /// reaching the configured fraction of starting equity sets the
    /// shutdown window. Both are reported back for alerting.
    pub fn record_close(
        &mut self,
        now: DateTime<Utc>,
        pnl: Decimal,
    ) -> Result<CloseEffects, CycleError> {
        let mut next = self.state.clone();
        let mut effects = CloseEffects::default();

        let today = now.date_naive();
        if next.day != today {
            next.day = today;
            next.daily_pnl = Decimal::ZERO;
        }
        next.daily_pnl += pnl;
        next.last_trade_at = Some(now);

        if pnl < Decimal::ZERO {
            next.consecutive_losses += 1;
            if next.consecutive_losses >= self.config.loss_streak_threshold {
                next.pause_until = Some(now + self.config.pause_duration);
                next.consecutive_losses = 0;
                effects.pause_triggered = true;
            }
        } else {
            next.consecutive_losses = 0;
        }

        let daily_limit = self.config.daily_loss_fraction * self.config.starting_equity;
        if next.daily_pnl <= -daily_limit {
            next.shutdown_until = Some(now + self.config.shutdown_duration);
            effects.shutdown_triggered = true;
        }

        self.commit(next)?;
        Ok(effects)
    }

    /// Persist-then-commit: never mutate in-memory state the file rejected.
    fn commit(&mut self, next: RiskState) -> Result<(), CycleError> {
        self.file.write(&next)?;
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn guard(dir: &TempDir) -> RiskGuard {
        guard_with(dir, GuardConfig::default())
    }

    fn guard_with(dir: &TempDir, config: GuardConfig) -> RiskGuard {
        let file = StateFile::new(dir.path().join("guard_state.json"));
        RiskGuard::load(config, file, at(0))
    }

    #[test]
    fn allows_by_default() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);
        assert_eq!(g.may_open(at(0), false), Verdict::Allow);
    }

    #[test]
    fn denies_while_position_open() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);
        assert_eq!(
            g.may_open(at(0), true),
            Verdict::Deny(DenyReason::PositionOpen)
        );
    }

    #[test]
    fn rate_ceiling_over_trailing_hour() {
        let dir = TempDir::new().unwrap();
        let mut g = guard_with(
            &dir,
            GuardConfig { cooldown: Duration::zero(), ..GuardConfig::default() },
        );

        g.record_open(at(0)).unwrap();
        g.record_open(at(10)).unwrap();
        assert_eq!(
            g.may_open(at(20), false),
            Verdict::Deny(DenyReason::RateLimit)
        );

        // The first open ages out of the trailing window.
        assert_eq!(g.may_open(at(61), false), Verdict::Allow);
    }

    #[test]
    fn cooldown_after_close() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);

        g.record_close(at(0), dec!(5)).unwrap();
        assert_eq!(
            g.may_open(at(10), false),
            Verdict::Deny(DenyReason::Cooldown)
        );
        assert_eq!(g.may_open(at(30), false), Verdict::Allow);
    }

    #[test]
    fn loss_streak_pauses_then_rearms() {
        let dir = TempDir::new().unwrap();
        let mut g = guard_with(
            &dir,
            GuardConfig { cooldown: Duration::zero(), ..GuardConfig::default() },
        );

        assert_eq!(g.record_close(at(0), dec!(-10)).unwrap(), CloseEffects::default());
        assert_eq!(g.record_close(at(1), dec!(-10)).unwrap(), CloseEffects::default());
        let effects = g.record_close(at(2), dec!(-10)).unwrap();
        assert!(effects.pause_triggered);

        assert_eq!(
            g.may_open(at(3), false),
            Verdict::Deny(DenyReason::LossStreakPause)
        );
        assert_eq!(g.state().consecutive_losses, 0);

        // One second past the pause window, only the remaining rules apply.
        let after = at(2) + Duration::hours(24) + Duration::seconds(1);
        g.tick(after).unwrap();
        assert_eq!(g.may_open(after, false), Verdict::Allow);
    }

    #[test]
    fn winning_close_resets_streak() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);
        g.record_close(at(0), dec!(-10)).unwrap();
        g.record_close(at(1), dec!(-10)).unwrap();
        g.record_close(at(2), dec!(10)).unwrap();
        let effects = g.record_close(at(3), dec!(-10)).unwrap();
        assert!(!effects.pause_triggered);
        assert_eq!(g.state().consecutive_losses, 1);
    }

    #[test]
    fn daily_loss_triggers_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);

        // 6% of 10_000 = 600
        let effects = g.record_close(at(0), dec!(-600)).unwrap();
        assert!(effects.shutdown_triggered);
        assert_eq!(
            g.may_open(at(1), false),
            Verdict::Deny(DenyReason::DailyLossShutdown)
        );
        assert!(g.in_shutdown(at(1)));

        // Shutdown outranks every later rule.
        assert_eq!(
            g.may_open(at(1), true),
            Verdict::Deny(DenyReason::DailyLossShutdown)
        );

        let after = at(0) + Duration::hours(24) + Duration::seconds(1);
        g.tick(after).unwrap();
        assert!(!g.in_shutdown(after));
    }

    #[test]
    fn daily_pnl_resets_at_utc_midnight() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);
        g.record_close(at(0), dec!(-500)).unwrap();
        assert_eq!(g.state().daily_pnl, dec!(-500));

        let next_day = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 1).unwrap();
        g.tick(next_day).unwrap();
        assert_eq!(g.state().daily_pnl, Decimal::ZERO);

        // A fresh day's loss counts from zero, not yesterday's total.
        let effects = g.record_close(next_day, dec!(-500)).unwrap();
        assert!(!effects.shutdown_triggered);
    }

    #[test]
    fn counters_survive_restart() {
        let dir = TempDir::new().unwrap();
        {
            let mut g = guard(&dir);
            g.record_close(at(0), dec!(-600)).unwrap();
        }

        // Reload from the same state file: the shutdown window is intact.
        let file = StateFile::new(dir.path().join("guard_state.json"));
        let mut g = RiskGuard::load(GuardConfig::default(), file, at(5));
        assert_eq!(
            g.may_open(at(5), false),
            Verdict::Deny(DenyReason::DailyLossShutdown)
        );
    }

    #[test]
    fn shutdown_outranks_pause() {
        let dir = TempDir::new().unwrap();
        let mut g = guard(&dir);
        g.record_close(at(0), dec!(-200)).unwrap();
        g.record_close(at(1), dec!(-200)).unwrap();
        let effects = g.record_close(at(2), dec!(-200)).unwrap();
        assert!(effects.pause_triggered);
        assert!(effects.shutdown_triggered);
        assert_eq!(
            g.may_open(at(3), false),
            Verdict::Deny(DenyReason::DailyLossShutdown)
        );
    }
}
