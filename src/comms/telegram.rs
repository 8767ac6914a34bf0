//! Telegram notifications.
//!
//! Fire-and-forget: a failed send is logged and never disturbs the cycle.
//! Only events that need human attention go out - startup, fills, closes,
//! execution/persistence alerts, risk window activations.

use rust_decimal::Decimal;
use tracing::warn;

use crate::core::types::Side;

pub struct Notifier {
    enabled: bool,
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(enabled: bool, bot_token: String, chat_id: String) -> Self {
        Self {
            enabled,
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, String::new(), String::new())
    }

    pub async fn send(&self, message: &str) {
        if !self.enabled {
            return;
        }
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let params = [
            ("chat_id", self.chat_id.as_str()),
            ("text", message),
            ("parse_mode", "HTML"),
        ];

        match self.client.post(&url).form(&params).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!("telegram send failed: {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => warn!("telegram error: {e}"),
        }
    }

    pub async fn send_startup(&self, equity: Decimal, position: Option<&str>) {
        let position_line = position.unwrap_or("none (flat)");
        let msg = format!(
            "🚀 <b>WARDEN</b> started\n\n\
            Equity: ${equity:.2}\n\
            Position: {position_line}\n\n\
            Monitoring..."
        );
        self.send(&msg).await;
    }

    pub async fn send_open(&self, side: Side, size: Decimal, price: Decimal, stop: Decimal, target: Decimal) {
        let emoji = match side {
            Side::Long => "🟢",
            Side::Short => "🔴",
        };
        let msg = format!(
            "{emoji} <b>OPENED {side}</b>\n\n\
            Size: {size}\n\
            Price: {price}\n\
            SL: {stop}\n\
            TP: {target}"
        );
        self.send(&msg).await;
    }

    pub async fn send_close(&self, reason: &str, price: Decimal, pnl: Decimal) {
        let emoji = if pnl >= Decimal::ZERO { "✅" } else { "📉" };
        let msg = format!(
            "{emoji} <b>CLOSED</b>\n\n\
            Reason: {reason}\n\
            Price: {price}\n\
            P&L: {pnl:+.2}"
        );
        self.send(&msg).await;
    }

    pub async fn send_alert(&self, context: &str, error: &str) {
        let msg = format!("⚠️ <b>ALERT</b>\n\nContext: {context}\nError: {error}");
        self.send(&msg).await;
    }

    pub async fn send_shutdown_alert(&self, daily_pnl: Decimal, hours: i64) {
        let msg = format!(
            "🚨 <b>DAILY LOSS SHUTDOWN</b>\n\n\
            Day P&L: {daily_pnl:+.2}\n\
            No entries for the next {hours}h."
        );
        self.send(&msg).await;
    }

    pub async fn send_daily_summary(
        &self,
        closed: usize,
        win_rate_pct: Decimal,
        total_pnl: Decimal,
    ) {
        let msg = format!(
            "📊 <b>Daily Summary</b>\n\n\
            Closed trades: {closed}\n\
            Win rate: {win_rate_pct:.1}%\n\
            P&L: {total_pnl:+.2}"
        );
        self.send(&msg).await;
    }

    pub async fn send_pause_alert(&self, hours: i64) {
        let msg = format!(
            "⏸ <b>LOSS STREAK PAUSE</b>\n\n\
            Consecutive losses hit the limit.\n\
            No entries for the next {hours}h."
        );
        self.send(&msg).await;
    }
}
