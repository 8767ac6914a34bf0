//! Configuration loader.
//!
//! Infrastructure and guardrail settings only; the decision logic itself
//! lives behind the oracle and takes no tuning from here. Unknown keys are
//! rejected at load so a misspelled option fails loudly instead of being
//! silently ignored.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::core::guard::GuardConfig;
use crate::core::scheduler::SchedulerConfig;
use crate::filters::{BiasFilter, FilterPipeline, TimeOfDayFilter, VolatilityGate};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default, rename = "loop")]
    pub cycle: LoopConfig,
    #[serde(default)]
    pub guard: GuardSection,
    #[serde(default)]
    pub position: PositionSection,
    #[serde(default)]
    pub filters: FiltersSection,
    pub oracle: OracleSection,
    #[serde(default)]
    pub exchange: ExchangeSection,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopConfig {
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

fn default_cycle_interval_secs() -> u64 {
    300
}

fn default_oracle_timeout_secs() -> u64 {
    15
}

fn default_execution_timeout_secs() -> u64 {
    20
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardSection {
    #[serde(default = "default_max_opens_per_hour")]
    pub max_opens_per_hour: usize,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_loss_streak_threshold")]
    pub loss_streak_threshold: u32,
    #[serde(default = "default_pause_hours")]
    pub pause_hours: i64,
    #[serde(default = "default_daily_loss_fraction")]
    pub daily_loss_fraction: Decimal,
    #[serde(default = "default_shutdown_hours")]
    pub shutdown_hours: i64,
    #[serde(default = "default_starting_equity")]
    pub starting_equity: Decimal,
}

fn default_max_opens_per_hour() -> usize {
    2
}

fn default_cooldown_minutes() -> i64 {
    30
}

fn default_loss_streak_threshold() -> u32 {
    3
}

fn default_pause_hours() -> i64 {
    24
}

fn default_daily_loss_fraction() -> Decimal {
    dec!(0.06)
}

fn default_shutdown_hours() -> i64 {
    24
}

fn default_starting_equity() -> Decimal {
    dec!(10000)
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            max_opens_per_hour: default_max_opens_per_hour(),
            cooldown_minutes: default_cooldown_minutes(),
            loss_streak_threshold: default_loss_streak_threshold(),
            pause_hours: default_pause_hours(),
            daily_loss_fraction: default_daily_loss_fraction(),
            shutdown_hours: default_shutdown_hours(),
            starting_equity: default_starting_equity(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionSection {
    #[serde(default = "default_minimum_hold_minutes")]
    pub minimum_hold_minutes: i64,
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: Decimal,
}

fn default_minimum_hold_minutes() -> i64 {
    15
}

fn default_max_position_fraction() -> Decimal {
    dec!(0.5)
}

impl Default for PositionSection {
    fn default() -> Self {
        Self {
            minimum_hold_minutes: default_minimum_hold_minutes(),
            max_position_fraction: default_max_position_fraction(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiltersSection {
    #[serde(default)]
    pub time: TimeFilterSection,
    #[serde(default)]
    pub volatility: VolatilitySection,
    #[serde(default)]
    pub bias: BiasSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeFilterSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// UTC wall-clock windows, "HH:MM-HH:MM"; start past end crosses midnight
    #[serde(default = "default_blocked_windows")]
    pub blocked_windows: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_blocked_windows() -> Vec<String> {
    vec!["16:30-18:00".to_string(), "23:00-13:30".to_string()]
}

impl Default for TimeFilterSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            blocked_windows: default_blocked_windows(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolatilitySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_lookback_multiplier")]
    pub lookback_multiplier: usize,
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: Decimal,
}

fn default_atr_period() -> usize {
    14
}

fn default_lookback_multiplier() -> usize {
    3
}

fn default_compression_ratio() -> Decimal {
    dec!(0.75)
}

impl Default for VolatilitySection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            atr_period: default_atr_period(),
            lookback_multiplier: default_lookback_multiplier(),
            compression_ratio: default_compression_ratio(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BiasSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bias_lookback")]
    pub lookback: usize,
    #[serde(default = "default_swing_sensitivity")]
    pub swing_sensitivity: Decimal,
}

fn default_bias_lookback() -> usize {
    20
}

fn default_swing_sensitivity() -> Decimal {
    dec!(0.5)
}

impl Default for BiasSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            lookback: default_bias_lookback(),
            swing_sensitivity: default_swing_sensitivity(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleSection {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeSection {
    #[serde(default = "default_true")]
    pub paper_mode: bool,
    #[serde(default = "default_pair")]
    pub pair: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_pair() -> String {
    "ETH-USDT".to_string()
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            paper_mode: true,
            pair: default_pair(),
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        let config: Config = toml::from_str(&contents).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.guard.daily_loss_fraction <= Decimal::ZERO
            || self.guard.daily_loss_fraction >= Decimal::ONE
        {
            bail!("guard.daily_loss_fraction must be in (0, 1)");
        }
        if self.position.max_position_fraction <= Decimal::ZERO
            || self.position.max_position_fraction > Decimal::ONE
        {
            bail!("position.max_position_fraction must be in (0, 1]");
        }
        if !self.exchange.paper_mode && self.exchange.base_url.is_empty() {
            bail!("exchange.base_url required when paper_mode is off");
        }
        // Parse eagerly so a bad window string fails at startup.
        self.blocked_windows()?;
        Ok(())
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            max_opens_per_hour: self.guard.max_opens_per_hour,
            cooldown: chrono::Duration::minutes(self.guard.cooldown_minutes),
            loss_streak_threshold: self.guard.loss_streak_threshold,
            pause_duration: chrono::Duration::hours(self.guard.pause_hours),
            daily_loss_fraction: self.guard.daily_loss_fraction,
            shutdown_duration: chrono::Duration::hours(self.guard.shutdown_hours),
            starting_equity: self.guard.starting_equity,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            cycle_interval: std::time::Duration::from_secs(self.cycle.cycle_interval_secs),
            execution_timeout: std::time::Duration::from_secs(self.cycle.execution_timeout_secs),
        }
    }

    pub fn oracle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle.oracle_timeout_secs)
    }

    pub fn minimum_hold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.position.minimum_hold_minutes)
    }

    pub fn pipeline(&self) -> Result<FilterPipeline> {
        Ok(FilterPipeline {
            time: TimeOfDayFilter {
                enabled: self.filters.time.enabled,
                blocked_windows: self.blocked_windows()?,
            },
            volatility: VolatilityGate {
                enabled: self.filters.volatility.enabled,
                atr_period: self.filters.volatility.atr_period,
                lookback_multiplier: self.filters.volatility.lookback_multiplier,
                compression_ratio: self.filters.volatility.compression_ratio,
            },
            bias: BiasFilter {
                enabled: self.filters.bias.enabled,
                lookback: self.filters.bias.lookback,
                swing_sensitivity: self.filters.bias.swing_sensitivity,
            },
        })
    }

    fn blocked_windows(&self) -> Result<Vec<(NaiveTime, NaiveTime)>> {
        self.filters
            .time
            .blocked_windows
            .iter()
            .map(|window| parse_window(window))
            .collect()
    }
}

fn parse_window(window: &str) -> Result<(NaiveTime, NaiveTime)> {
    let (start, end) = window
        .split_once('-')
        .with_context(|| format!("window {window:?} must be HH:MM-HH:MM"))?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
        .with_context(|| format!("bad start time in window {window:?}"))?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")
        .with_context(|| format!("bad end time in window {window:?}"))?;
    Ok((start, end))
}
