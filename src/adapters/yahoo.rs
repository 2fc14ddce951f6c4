//! Yahoo Finance chart API as a quote source.
//!
//! Uses the 1-day, 1-minute chart endpoint and builds the snapshot from the
//! most recent complete bar.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::QuoteConfig;
use crate::domain::{QuoteBar, QuoteSnapshot};
use crate::error::{EngineError, Result};
use crate::market::QuoteFetcher;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; challenge-engine/0.1)";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl QuoteSeries {
    /// (open, high, low, close) when every field of bar `i` is present
    fn bar(&self, i: usize) -> Option<(f64, f64, f64, f64)> {
        let get = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        Some((get(&self.open)?, get(&self.high)?, get(&self.low)?, get(&self.close)?))
    }

    fn complete_bars(&self) -> Vec<usize> {
        (0..self.close.len()).filter(|&i| self.bar(i).is_some()).collect()
    }
}

/// Quote source backed by Yahoo Finance
#[derive(Clone)]
pub struct YahooQuoteFetcher {
    http: Client,
    base_url: String,
}

impl YahooQuoteFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to build quote HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &QuoteConfig) -> Result<Self> {
        Self::new(&config.base_url, config.fetch_timeout())
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1d&interval=1m",
            self.base_url,
            urlencoding::encode(symbol)
        )
    }
}

fn unavailable(symbol: &str, why: impl std::fmt::Display) -> EngineError {
    EngineError::Unavailable(format!("{}: {}", symbol, why))
}

fn parse_chart(symbol: &str, body: ChartEnvelope, fetched_at: DateTime<Utc>) -> Result<QuoteSnapshot> {
    if let Some(err) = body.chart.error {
        let why = err
            .description
            .or(err.code)
            .unwrap_or_else(|| "provider error".to_string());
        return Err(unavailable(symbol, why));
    }

    let result = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| unavailable(symbol, "no chart data"))?;
    let series = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| unavailable(symbol, "no quote series"))?;

    let complete = series.complete_bars();
    let (last, prev) = match complete.as_slice() {
        [] => return Err(unavailable(symbol, "no complete bars")),
        [.., prev, last] => (*last, Some(*prev)),
        [last] => (*last, None),
    };

    let (open, high, low, close) = series
        .bar(last)
        .ok_or_else(|| unavailable(symbol, "incomplete bar"))?;
    let previous_close = prev
        .and_then(|i| series.bar(i))
        .map(|(_, _, _, c)| c)
        .unwrap_or(0.0);
    let volume = series
        .volume
        .get(last)
        .copied()
        .flatten()
        .map(|v| v.max(0.0) as u64)
        .unwrap_or(0);
    let time = result
        .timestamp
        .get(last)
        .and_then(|&ts| Utc.timestamp_opt(ts, 0).single());

    QuoteSnapshot::from_bar(
        symbol,
        QuoteBar {
            open,
            high,
            low,
            close,
            previous_close,
            volume,
            time,
        },
        fetched_at,
    )
}

#[async_trait]
impl QuoteFetcher for YahooQuoteFetcher {
    fn name(&self) -> &str {
        "yahoo"
    }

    #[instrument(skip(self))]
    async fn fetch(&self, symbol: &str) -> Result<QuoteSnapshot> {
        let url = self.chart_url(symbol);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(symbol, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(symbol, format!("HTTP {}", status)));
        }

        let body: ChartEnvelope = resp.json().await.map_err(|e| unavailable(symbol, e))?;
        let snapshot = parse_chart(symbol, body, Utc::now())?;
        debug!(symbol, price = %snapshot.current_price, "Fetched quote");
        Ok(snapshot)
    }
}
