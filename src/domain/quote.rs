use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::round_cents;
use crate::error::{EngineError, Result};

/// Raw provider bar, as reported before conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Close of the bar before this one, 0 when there is none
    pub previous_close: f64,
    pub volume: u64,
    pub time: Option<DateTime<Utc>>,
}

/// Point-in-time quote for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub previous_close: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub change: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub change_percent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    pub volume: u64,
    #[serde(rename = "timestamp")]
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

fn to_decimal(field: &str, value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(EngineError::Unavailable(format!(
            "provider returned non-finite {field}"
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| EngineError::Unavailable(format!("{field} out of range: {value}")))
}

impl QuoteSnapshot {
    /// Build a snapshot from a provider bar. Prices are rounded to cents.
    pub fn from_bar(symbol: &str, bar: QuoteBar, fetched_at: DateTime<Utc>) -> Result<Self> {
        let open = to_decimal("open", bar.open)?;
        let close = to_decimal("close", bar.close)?;
        let change = close - open;
        let change_percent = if open.is_zero() {
            Decimal::ZERO
        } else {
            change / open * Decimal::ONE_HUNDRED
        };

        Ok(Self {
            symbol: symbol.to_uppercase(),
            current_price: round_cents(close),
            previous_close: round_cents(to_decimal("previous_close", bar.previous_close)?),
            change: round_cents(change),
            change_percent: round_cents(change_percent),
            high: round_cents(to_decimal("high", bar.high)?),
            low: round_cents(to_decimal("low", bar.low)?),
            volume: bar.volume,
            fetched_at,
            last_updated: bar.time,
        })
    }
}

/// Body returned in place of a quote when the lookup failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteError {
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-symbol outcome of a quote lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuoteResponse {
    Quote(QuoteSnapshot),
    Error(QuoteError),
}

impl QuoteResponse {
    pub fn failed(err: &EngineError) -> Self {
        QuoteResponse::Error(QuoteError {
            error: err.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QuoteResponse::Error(_))
    }

    pub fn snapshot(&self) -> Option<&QuoteSnapshot> {
        match self {
            QuoteResponse::Quote(s) => Some(s),
            QuoteResponse::Error(_) => None,
        }
    }
}

impl From<Result<QuoteSnapshot>> for QuoteResponse {
    fn from(result: Result<QuoteSnapshot>) -> Self {
        match result {
            Ok(snapshot) => QuoteResponse::Quote(snapshot),
            Err(e) => QuoteResponse::failed(&e),
        }
    }
}
