//! REST execution client.
//!
//! Talks to an order-execution service over authenticated HTTP: a market
//! open with attached stop/target, a close, a position query and an equity
//! query. The loop never interprets venue-specific error codes - any
//! non-success response or transport failure is a generic execution error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::types::Side;
use crate::error::CycleError;

use super::{ExchangePosition, Execution, Fill};

pub struct RestExchange {
    base_url: String,
    api_key: String,
    pair: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OpenRequest<'a> {
    pair: &'a str,
    side: &'a str,
    size: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    max_slippage_pct: Decimal,
}

#[derive(Serialize)]
struct CloseRequest<'a> {
    pair: &'a str,
    reason: &'a str,
}

#[derive(Deserialize)]
struct FillResponse {
    price: Decimal,
    size: Decimal,
    #[serde(default)]
    pnl: Option<Decimal>,
}

#[derive(Deserialize)]
struct PositionResponse {
    side: String,
    size: Decimal,
    entry_price: Decimal,
}

#[derive(Deserialize)]
struct AccountResponse {
    equity: Decimal,
}

impl RestExchange {
    pub fn new(base_url: String, api_key: String, pair: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            pair,
            client: reqwest::Client::new(),
        }
    }

    fn execution_error(context: &str, e: impl std::fmt::Display) -> CycleError {
        CycleError::Execution(format!("{context}: {e}"))
    }
}

#[async_trait]
impl Execution for RestExchange {
    async fn open(
        &self,
        side: Side,
        size: Decimal,
        stop: Decimal,
        target: Decimal,
        max_slippage_pct: Decimal,
    ) -> Result<Fill, CycleError> {
        let request = OpenRequest {
            pair: &self.pair,
            side: match side {
                Side::Long => "long",
                Side::Short => "short",
            },
            size,
            stop_loss: stop,
            take_profit: target,
            max_slippage_pct,
        };

        let resp = self
            .client
            .post(format!("{}/orders", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::execution_error("open request", e))?;
        if !resp.status().is_success() {
            return Err(CycleError::Execution(format!("open rejected: {}", resp.status())));
        }

        let fill: FillResponse = resp
            .json()
            .await
            .map_err(|e| Self::execution_error("open response", e))?;
        Ok(Fill { price: fill.price, size: fill.size, pnl: None })
    }

    async fn close(&self, reason: &str) -> Result<Fill, CycleError> {
        let resp = self
            .client
            .post(format!("{}/close", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CloseRequest { pair: &self.pair, reason })
            .send()
            .await
            .map_err(|e| Self::execution_error("close request", e))?;
        if !resp.status().is_success() {
            return Err(CycleError::Execution(format!("close rejected: {}", resp.status())));
        }

        let fill: FillResponse = resp
            .json()
            .await
            .map_err(|e| Self::execution_error("close response", e))?;
        Ok(Fill { price: fill.price, size: fill.size, pnl: fill.pnl })
    }

    async fn query_position(&self) -> Result<Option<ExchangePosition>, CycleError> {
        let resp = self
            .client
            .get(format!("{}/position", self.base_url))
            .query(&[("pair", self.pair.as_str())])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::execution_error("position query", e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CycleError::Execution(format!(
                "position query failed: {}",
                resp.status()
            )));
        }

        let position: Option<PositionResponse> = resp
            .json()
            .await
            .map_err(|e| Self::execution_error("position response", e))?;
        Ok(position.map(|p| ExchangePosition {
            side: if p.side == "short" { Side::Short } else { Side::Long },
            size: p.size,
            entry_price: p.entry_price,
        }))
    }

    async fn equity(&self) -> Result<Decimal, CycleError> {
        let resp = self
            .client
            .get(format!("{}/account", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::execution_error("account query", e))?;
        if !resp.status().is_success() {
            return Err(CycleError::Execution(format!(
                "account query failed: {}",
                resp.status()
            )));
        }

        let account: AccountResponse = resp
            .json()
            .await
            .map_err(|e| Self::execution_error("account response", e))?;
        Ok(account.equity)
    }
}
