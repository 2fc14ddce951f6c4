use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::domain::DailyPnlScope;
use crate::error::{EngineError, Result};
use crate::ledger::TradeLedger;

/// Midnight UTC of the day containing `as_of`
pub fn day_start(as_of: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&as_of.date_naive().and_time(NaiveTime::MIN))
}

/// Sums a challenge's trade P&L for the current UTC day
#[derive(Clone)]
pub struct DailyPnlAggregator {
    ledger: Arc<dyn TradeLedger>,
    scope: DailyPnlScope,
}

impl DailyPnlAggregator {
    pub fn new(ledger: Arc<dyn TradeLedger>, scope: DailyPnlScope) -> Self {
        Self { ledger, scope }
    }

    /// Realized P&L of trades created on or after `day_start(as_of)`; 0 when none
    pub async fn daily_pnl(&self, challenge_id: i64, as_of: DateTime<Utc>) -> Result<Decimal> {
        let since = day_start(as_of);
        let trades = self.ledger.list_trades(challenge_id, since).await?;

        let pnl = trades
            .iter()
            .filter(|t| t.created_at >= since && self.scope.includes(t))
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t.profit_loss))
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "daily P&L of challenge {} is out of range",
                    challenge_id
                ))
            })?;

        debug!(
            challenge_id,
            trades = trades.len(),
            %pnl,
            "Aggregated daily P&L"
        );
        Ok(pnl)
    }
}
