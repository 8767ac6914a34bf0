//! Warden - single-position trading loop with enforced guardrails.

use anyhow::Result;
use chrono::Utc;
use std::str::FromStr;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use warden::comms::Notifier;
use warden::config::Config;
use warden::core::guard::RiskGuard;
use warden::core::orchestrator::Orchestrator;
use warden::core::position::Lifecycle;
use warden::core::scheduler::Scheduler;
use warden::data::kucoin::KucoinData;
use warden::exchange::paper::PaperExchange;
use warden::exchange::rest::RestExchange;
use warden::exchange::Execution;
use warden::oracle::claude::ClaudeOracle;
use warden::store::{HistoryStore, RollingStore, StateFile, TradeLog};

const SEP: &str = "===========================================================";

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load("warden.toml").unwrap_or_else(|e| {
        eprintln!("Failed to load warden.toml: {e:#}. Exiting.");
        std::process::exit(1);
    });

    let level = Level::from_str(&cfg.system.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", SEP);
    info!("  {} - guarded single-position trading loop", cfg.system.name);
    info!("  Pair: {} | Paper: {}", cfg.exchange.pair, cfg.exchange.paper_mode);
    info!("{}", SEP);

    let now = Utc::now();
    let data_dir = cfg.store.data_dir.clone();

    // Bounded-memory stores and crash-safe state files.
    let history: HistoryStore = RollingStore::open(data_dir.join("history.jsonl"))?;
    let trade_log: TradeLog = RollingStore::open(data_dir.join("trades.jsonl"))?;
    let guard = RiskGuard::load(
        cfg.guard_config(),
        StateFile::new(data_dir.join("guard_state.json")),
        now,
    );
    if guard.in_shutdown(now) {
        warn!("daily-loss shutdown window still active from a previous run");
    }
    let lifecycle = Lifecycle::load(
        cfg.minimum_hold(),
        StateFile::new(data_dir.join("position.json")),
    );

    let exchange: Box<dyn Execution> = if cfg.exchange.paper_mode {
        info!("Execution: paper (starting equity {})", cfg.guard.starting_equity);
        Box::new(PaperExchange::new(cfg.guard.starting_equity))
    } else {
        info!("Execution: live via {}", cfg.exchange.base_url);
        Box::new(RestExchange::new(
            cfg.exchange.base_url.clone(),
            cfg.exchange.api_key.clone(),
            cfg.exchange.pair.clone(),
        ))
    };

    let oracle = ClaudeOracle::new(
        cfg.oracle.api_key.clone(),
        cfg.oracle.model.clone(),
        cfg.oracle.endpoint.clone(),
    );
    let orchestrator = Orchestrator::new(
        Box::new(oracle),
        history,
        trade_log,
        cfg.oracle_timeout(),
        cfg.position.max_position_fraction,
    );

    let notifier = Notifier::new(
        cfg.telegram.enabled,
        cfg.telegram.bot_token.clone(),
        cfg.telegram.chat_id.clone(),
    );

    match exchange.equity().await {
        Ok(equity) => {
            info!("Account equity: {equity}");
            let position_line = lifecycle
                .position()
                .map(|p| format!("{} {} @ {}", p.side, p.size, p.entry_price));
            notifier
                .send_startup(equity, position_line.as_deref())
                .await;
        }
        Err(e) => warn!("failed to query equity at startup: {e}"),
    }

    let mut scheduler = Scheduler::new(
        cfg.scheduler_config(),
        guard,
        lifecycle,
        cfg.pipeline()?,
        orchestrator,
        exchange,
        Box::new(KucoinData::new(cfg.exchange.pair.clone())),
        notifier,
    );

    // Reconcile the persisted position record against the exchange before
    // the first cycle; the exchange wins any disagreement.
    if let Err(e) = scheduler.reconcile(now).await {
        warn!("startup reconciliation failed: {e}");
    }

    info!("Cycle interval: {}s", cfg.cycle.cycle_interval_secs);
    info!("Guard: max {}/h, cooldown {}m, streak {} -> {}h pause, daily {} -> {}h shutdown",
        cfg.guard.max_opens_per_hour,
        cfg.guard.cooldown_minutes,
        cfg.guard.loss_streak_threshold,
        cfg.guard.pause_hours,
        cfg.guard.daily_loss_fraction,
        cfg.guard.shutdown_hours,
    );
    info!("Waiting for first cycle...");

    scheduler
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    info!("Stopped.");
    Ok(())
}
