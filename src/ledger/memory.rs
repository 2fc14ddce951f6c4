use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChallengeStore, TradeLedger};
use crate::domain::{Challenge, ChallengeStatus, NewChallenge, NewTrade, Trade};
use crate::error::{EngineError, Result};

#[derive(Default)]
struct Inner {
    challenges: HashMap<i64, Challenge>,
    trades: Vec<Trade>,
    next_challenge_id: i64,
    next_trade_id: i64,
}

/// Process-local store, one lock over challenges and trades
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trade_count(&self, challenge_id: i64) -> usize {
        let inner = self.inner.read().await;
        inner
            .trades
            .iter()
            .filter(|t| t.challenge_id == challenge_id)
            .count()
    }
}

fn terminal_error(challenge: &Challenge) -> EngineError {
    EngineError::InvalidState(format!(
        "challenge {} is already {}",
        challenge.id, challenge.status
    ))
}

#[async_trait]
impl ChallengeStore for InMemoryStore {
    async fn load(&self, challenge_id: i64) -> Result<Challenge> {
        let inner = self.inner.read().await;
        inner
            .challenges
            .get(&challenge_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(challenge_id))
    }

    async fn insert(&self, challenge: NewChallenge) -> Result<Challenge> {
        challenge.validate()?;

        let mut inner = self.inner.write().await;
        inner.next_challenge_id += 1;
        let id = inner.next_challenge_id;
        let record = challenge.into_challenge(id, Utc::now());
        inner.challenges.insert(id, record.clone());

        debug!(challenge_id = id, "Inserted challenge");
        Ok(record)
    }

    async fn save(&self, challenge: &Challenge) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .challenges
            .get_mut(&challenge.id)
            .ok_or_else(|| EngineError::not_found(challenge.id))?;

        if stored.status != ChallengeStatus::Active {
            return Err(terminal_error(stored));
        }
        if stored.current_balance != challenge.current_balance {
            return Err(EngineError::InvalidState(format!(
                "challenge {} balance moved from {} to {}",
                challenge.id, challenge.current_balance, stored.current_balance
            )));
        }

        stored.status = challenge.status;
        stored.current_balance = challenge.current_balance;
        Ok(())
    }

    async fn record_trade(&self, trade: NewTrade) -> Result<(Trade, Challenge)> {
        let mut inner = self.inner.write().await;

        let challenge = inner
            .challenges
            .get(&trade.challenge_id)
            .ok_or_else(|| EngineError::not_found(trade.challenge_id))?;
        if challenge.is_terminal() {
            return Err(terminal_error(challenge));
        }

        let balance = challenge
            .current_balance
            .checked_add(trade.profit_loss)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "trade P&L {} would take challenge {} balance out of range",
                    trade.profit_loss, trade.challenge_id
                ))
            })?;

        inner.next_trade_id += 1;
        let trade = trade.into_trade(inner.next_trade_id);

        let challenge = match inner.challenges.get_mut(&trade.challenge_id) {
            Some(c) => {
                c.current_balance = balance;
                c.clone()
            }
            None => return Err(EngineError::not_found(trade.challenge_id)),
        };
        inner.trades.push(trade.clone());

        Ok((trade, challenge))
    }
}

#[async_trait]
impl TradeLedger for InMemoryStore {
    async fn list_trades(&self, challenge_id: i64, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let inner = self.inner.read().await;
        Ok(inner
            .trades
            .iter()
            .filter(|t| t.challenge_id == challenge_id && t.created_at >= since)
            .cloned()
            .collect())
    }
}
