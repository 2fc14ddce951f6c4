use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{EngineError, Result};

/// Trade side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(EngineError::Validation(format!(
                "invalid trade side '{}'; expected BUY or SELL",
                raw
            ))),
        }
    }
}

/// Whether a trade's P&L is realized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(EngineError::Internal(format!("unknown trade status '{raw}'"))),
        }
    }
}

/// Which trades contribute to the daily P&L
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DailyPnlScope {
    /// Every trade of the day, open or closed
    #[default]
    #[serde(rename = "all")]
    All,
    /// Only trades whose P&L has been realized
    #[serde(rename = "closed")]
    ClosedOnly,
}

impl DailyPnlScope {
    pub fn includes(&self, trade: &Trade) -> bool {
        match self {
            DailyPnlScope::All => true,
            DailyPnlScope::ClosedOnly => trade.status == TradeStatus::Closed,
        }
    }
}

/// A recorded trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub challenge_id: i64,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    /// Signed realized amount; negative is a loss
    pub profit_loss: Decimal,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

/// A trade about to be appended to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub challenge_id: i64,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub profit_loss: Decimal,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

impl NewTrade {
    /// Simplified cash accounting: a buy debits `quantity * price` and stays
    /// open, a sell credits it and closes at the same price.
    ///
    /// Fails with `Validation` when the notional does not fit a `Decimal`.
    pub fn fill(
        challenge_id: i64,
        symbol: impl Into<String>,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let value = quantity.checked_mul(price).ok_or_else(|| {
            EngineError::Validation(format!(
                "trade value {} x {} is out of range",
                quantity, price
            ))
        })?;
        let (profit_loss, status, exit_price) = match side {
            TradeSide::Buy => (-value, TradeStatus::Open, None),
            TradeSide::Sell => (value, TradeStatus::Closed, Some(price)),
        };

        Ok(Self {
            challenge_id,
            symbol: symbol.into(),
            side,
            quantity,
            entry_price: price,
            exit_price,
            profit_loss,
            status,
            created_at,
        })
    }

    pub fn into_trade(self, id: i64) -> Trade {
        Trade {
            id,
            challenge_id: self.challenge_id,
            symbol: self.symbol,
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            profit_loss: self.profit_loss,
            status: self.status,
            created_at: self.created_at,
        }
    }
}
