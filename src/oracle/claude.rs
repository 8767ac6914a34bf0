//! Anthropic messages API client for the decision oracle.
//!
//! One client serves all three calls: entry proposal, risk validation and
//! position monitoring. Each call sends bounded context (recent candles,
//! the recent decision window, the open position where relevant) and asks
//! for a single JSON object back. Transport and HTTP failures surface as
//! `CycleError::Oracle`; response *content* is not judged here - the parse
//! layer decides whether it is usable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CycleError;

use super::{EntryContext, EntryProposal, MonitorContext, Oracle};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeOracle {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

const ENTRY_PROMPT: &str = "\
You are the entry decision source for an automated trading loop on a 5-minute \
chart. At most one position is open at a time and trades are rate limited, so \
keep entries sparse and skip marginal setups. Given the recent candles and \
the recent decision history, answer with one JSON object only, no prose: \
{\"side\": \"long\"|\"short\"|\"flat\", \"pattern\": string, \"reason\": string, \
\"position_fraction\": number between 0 and 0.5}. Use \"flat\" when nothing \
is worth taking.";

const RISK_PROMPT: &str = "\
You validate a proposed trade and set its risk parameters. Given the recent \
candles and the proposal, answer with one JSON object only, no prose: \
{\"stop_loss_pct\": number, \"take_profit_pct\": number, \"max_slippage_pct\": \
number}. Percentages are magnitudes relative to the entry price.";

const MONITOR_PROMPT: &str = "\
You monitor an open position. You may only hold or close it; changing \
direction is not available to you. Close only with an explicit reversal \
justification. Answer with one JSON object only, no prose: \
{\"action\": \"hold\"|\"close\", \"reason\": string}.";

impl ClaudeOracle {
    pub fn new(api_key: String, model: String, endpoint: Option<String>) -> Self {
        Self {
            api_key,
            model,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client: reqwest::Client::new(),
        }
    }

    async fn ask(&self, blocks: Vec<String>) -> Result<String, CycleError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 256,
            messages: vec![Message {
                role: "user",
                content: blocks
                    .into_iter()
                    .map(|text| ContentBlock { kind: "text", text })
                    .collect(),
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| CycleError::Oracle(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CycleError::Oracle(format!("status {}", resp.status())));
        }

        let body: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| CycleError::Oracle(format!("bad response body: {e}")))?;

        let text: Vec<String> = body
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        if text.is_empty() {
            return Err(CycleError::Oracle("empty response".to_string()));
        }
        Ok(text.join("\n"))
    }

    fn candles_block(ctx_candles: &[crate::core::types::Candle]) -> String {
        format!(
            "candles={}",
            serde_json::to_string(ctx_candles).unwrap_or_else(|_| "[]".to_string())
        )
    }
}

#[async_trait]
impl Oracle for ClaudeOracle {
    async fn entry_text(&self, ctx: &EntryContext<'_>) -> Result<String, CycleError> {
        let decisions = serde_json::to_string(ctx.recent_decisions)
            .unwrap_or_else(|_| "[]".to_string());
        self.ask(vec![
            ENTRY_PROMPT.to_string(),
            Self::candles_block(ctx.candles),
            format!("recent_decisions={decisions}"),
        ])
        .await
    }

    async fn risk_text(
        &self,
        ctx: &EntryContext<'_>,
        proposal: &EntryProposal,
    ) -> Result<String, CycleError> {
        let proposal = serde_json::to_string(proposal).unwrap_or_else(|_| "{}".to_string());
        self.ask(vec![
            RISK_PROMPT.to_string(),
            Self::candles_block(ctx.candles),
            format!("proposal={proposal}"),
        ])
        .await
    }

    async fn monitor_text(&self, ctx: &MonitorContext<'_>) -> Result<String, CycleError> {
        let position = serde_json::to_string(ctx.position)
            .unwrap_or_else(|_| "{}".to_string());
        self.ask(vec![
            MONITOR_PROMPT.to_string(),
            Self::candles_block(ctx.candles),
            format!("position={position}"),
        ])
        .await
    }
}
