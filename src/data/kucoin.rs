//! KuCoin public spot candles.
//!
//! Unauthenticated market data: one GET per fetch, candles come back
//! newest first as arrays of decimal strings and are reversed into the
//! oldest-first order the filters expect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::core::types::Candle;
use crate::error::CycleError;

use super::{MarketData, Timeframe};

const BASE_URL: &str = "https://api.kucoin.com";

pub struct KucoinData {
    symbol: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CandlesResponse {
    code: String,
    #[serde(default)]
    data: Vec<[String; 7]>,
}

impl KucoinData {
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            base_url: BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn kline_type(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M5 => "5min",
            Timeframe::M15 => "15min",
        }
    }

    fn parse_row(row: &[String; 7]) -> Option<Candle> {
        // Row layout: [time, open, close, high, low, volume, turnover]
        let ts = row[0].parse::<i64>().ok()?;
        let ts = DateTime::<Utc>::from_timestamp(ts, 0)?;
        Some(Candle::new(
            ts,
            Decimal::from_str(&row[1]).ok()?,
            Decimal::from_str(&row[3]).ok()?,
            Decimal::from_str(&row[4]).ok()?,
            Decimal::from_str(&row[2]).ok()?,
            Decimal::from_str(&row[5]).ok()?,
        ))
    }
}

#[async_trait]
impl MarketData for KucoinData {
    async fn candles(&self, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, CycleError> {
        let url = format!("{}/api/v1/market/candles", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[
                ("type", Self::kline_type(timeframe)),
                ("symbol", self.symbol.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CycleError::Oracle(format!("candle fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CycleError::Oracle(format!("candle fetch status {}", resp.status())));
        }

        let body: CandlesResponse = resp
            .json()
            .await
            .map_err(|e| CycleError::Oracle(format!("bad candle body: {e}")))?;
        if body.code != "200000" {
            return Err(CycleError::Oracle(format!("candle fetch code {}", body.code)));
        }

        // Newest first on the wire; keep the most recent `limit` and flip.
        let mut candles: Vec<Candle> = body
            .data
            .iter()
            .take(limit)
            .filter_map(Self::parse_row)
            .collect();
        candles.reverse();
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_wire_row() {
        let row = [
            "1764590400".to_string(),
            "2500.1".to_string(),
            "2510.2".to_string(),
            "2512.0".to_string(),
            "2498.7".to_string(),
            "153.4".to_string(),
            "384000.0".to_string(),
        ];
        let candle = KucoinData::parse_row(&row).unwrap();
        assert_eq!(candle.open, dec!(2500.1));
        assert_eq!(candle.close, dec!(2510.2));
        assert_eq!(candle.high, dec!(2512.0));
        assert_eq!(candle.low, dec!(2498.7));
        assert_eq!(candle.volume, dec!(153.4));
    }

    #[test]
    fn rejects_garbage_row() {
        let row = [
            "not a ts".to_string(),
            "2500".to_string(),
            "2510".to_string(),
            "2512".to_string(),
            "2498".to_string(),
            "153".to_string(),
            "0".to_string(),
        ];
        assert!(KucoinData::parse_row(&row).is_none());
    }

    #[test]
    fn kline_type_mapping() {
        assert_eq!(KucoinData::kline_type(Timeframe::M5), "5min");
        assert_eq!(KucoinData::kline_type(Timeframe::M15), "15min");
    }
}
