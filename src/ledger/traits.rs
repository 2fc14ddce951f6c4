use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Challenge, NewChallenge, NewTrade, Trade};
use crate::error::Result;

/// Owner of challenge records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Fetch a challenge; `NotFound` if the id is unknown
    async fn load(&self, challenge_id: i64) -> Result<Challenge>;

    /// Create a challenge in ACTIVE status with `current_balance = initial_balance`
    async fn insert(&self, challenge: NewChallenge) -> Result<Challenge>;

    /// Persist `(status, current_balance)` in one write.
    ///
    /// Compare-and-set: applies only while the stored record is still ACTIVE
    /// with the same balance the caller read. Otherwise `InvalidState`, and
    /// the caller is expected to reload.
    async fn save(&self, challenge: &Challenge) -> Result<()>;

    /// Append a trade and add its P&L to the balance atomically.
    ///
    /// Fails with `InvalidState` once the challenge is terminal.
    async fn record_trade(&self, trade: NewTrade) -> Result<(Trade, Challenge)>;
}

/// Read-only view over recorded trades
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeLedger: Send + Sync {
    /// Trades of a challenge with `created_at >= since`, in no particular order
    async fn list_trades(&self, challenge_id: i64, since: DateTime<Utc>) -> Result<Vec<Trade>>;
}
