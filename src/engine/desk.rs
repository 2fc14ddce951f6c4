use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{EvaluationReport, RuleEvaluator};
use crate::domain::{NewTrade, Trade, TradeSide};
use crate::error::{EngineError, Result};
use crate::services::Metrics;

/// A trade request against a challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTicket {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl TradeTicket {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::Validation("symbol must not be blank".into()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.price <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeOutcome {
    pub trade: Trade,
    pub evaluation: EvaluationReport,
}

/// Records trades and re-evaluates the challenge under its lock
pub struct TradeDesk {
    evaluator: Arc<RuleEvaluator>,
    metrics: Arc<Metrics>,
}

impl TradeDesk {
    pub fn new(evaluator: Arc<RuleEvaluator>) -> Self {
        Self {
            evaluator,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn execute(&self, challenge_id: i64, ticket: TradeTicket) -> Result<TradeOutcome> {
        self.execute_at(challenge_id, ticket, Utc::now()).await
    }

    #[instrument(skip(self, ticket), fields(symbol = %ticket.symbol, side = %ticket.side))]
    pub async fn execute_at(
        &self,
        challenge_id: i64,
        ticket: TradeTicket,
        at: DateTime<Utc>,
    ) -> Result<TradeOutcome> {
        ticket.validate()?;

        let locks = self.evaluator.locks();
        let _guard = locks.acquire(challenge_id).await;

        let store = self.evaluator.store();
        let challenge = store.load(challenge_id).await?;
        if !challenge.status.can_trade() {
            return Err(EngineError::InvalidState(format!(
                "challenge {} is {}; trading is closed",
                challenge_id, challenge.status
            )));
        }

        let new_trade = NewTrade::fill(
            challenge_id,
            ticket.symbol.trim().to_uppercase(),
            ticket.side,
            ticket.quantity,
            ticket.price,
            at,
        )?;
        let (trade, updated) = store.record_trade(new_trade).await?;
        self.metrics.inc_trades_recorded();

        info!(
            challenge_id,
            trade_id = trade.id,
            pnl = %trade.profit_loss,
            balance = %updated.current_balance,
            "Trade recorded"
        );

        let evaluation = self.evaluator.evaluate_locked(challenge_id, at).await?;
        Ok(TradeOutcome { trade, evaluation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RulesConfig;
    use crate::domain::{ChallengePlan, ChallengeStatus, NewChallenge};
    use crate::ledger::{ChallengeStore, InMemoryStore};
    use rust_decimal_macros::dec;

    async fn desk() -> (TradeDesk, Arc<InMemoryStore>, i64) {
        let store = Arc::new(InMemoryStore::new());
        let challenge = store
            .insert(NewChallenge::from_plan(
                1,
                ChallengePlan::Starter,
                &RulesConfig::default(),
            ))
            .await
            .unwrap();
        let evaluator = Arc::new(RuleEvaluator::new(
            store.clone(),
            store.clone(),
            RulesConfig::default(),
        ));
        (TradeDesk::new(evaluator), store, challenge.id)
    }

    fn ticket(side: TradeSide, quantity: Decimal, price: Decimal) -> TradeTicket {
        TradeTicket {
            symbol: "aapl".into(),
            side,
            quantity,
            price,
        }
    }

    #[tokio::test]
    async fn test_sell_closes_and_credits() {
        let (desk, store, id) = desk().await;
        let outcome = desk
            .execute(id, ticket(TradeSide::Sell, dec!(2), dec!(20)))
            .await
            .unwrap();

        assert_eq!(outcome.trade.symbol, "AAPL");
        assert_eq!(outcome.trade.exit_price, Some(dec!(20)));
        assert_eq!(outcome.evaluation.balance, dec!(1040));
        assert_eq!(outcome.evaluation.status, ChallengeStatus::Active);
        assert_eq!(store.load(id).await.unwrap().current_balance, dec!(1040));
    }

    #[tokio::test]
    async fn test_buy_breaching_daily_limit_fails() {
        let (desk, _store, id) = desk().await;
        // Starter: 1000 balance, 50 daily limit
        let outcome = desk
            .execute(id, ticket(TradeSide::Buy, dec!(1), dec!(50)))
            .await
            .unwrap();
        assert_eq!(outcome.evaluation.status, ChallengeStatus::Failed);

        let err = desk
            .execute(id, ticket(TradeSide::Sell, dec!(1), dec!(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_ticket_is_rejected() {
        let (desk, store, id) = desk().await;
        let huge = Decimal::from_scientific("1e20").unwrap();

        let err = desk
            .execute(id, ticket(TradeSide::Buy, huge, huge))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.trade_count(id).await, 0);

        // Largest notional that still fits fails the challenge instead of crashing
        let outcome = desk
            .execute(id, ticket(TradeSide::Buy, Decimal::MAX, Decimal::ONE))
            .await
            .unwrap();
        assert_eq!(outcome.evaluation.status, ChallengeStatus::Failed);
        assert_eq!(desk.evaluator.locks().tracked(), 0);
    }

    #[tokio::test]
    async fn test_invalid_ticket_rejected_before_lookup() {
        let (desk, store, id) = desk().await;
        for bad in [
            ticket(TradeSide::Buy, dec!(0), dec!(10)),
            ticket(TradeSide::Buy, dec!(1), dec!(-1)),
            TradeTicket {
                symbol: "  ".into(),
                ..ticket(TradeSide::Sell, dec!(1), dec!(1))
            },
        ] {
            assert!(matches!(
                desk.execute(id, bad).await,
                Err(EngineError::Validation(_))
            ));
        }
        assert_eq!(store.trade_count(id).await, 0);

        assert!(matches!(
            desk.execute(id + 100, ticket(TradeSide::Buy, dec!(1), dec!(1)))
                .await,
            Err(EngineError::NotFound { .. })
        ));
    }
}
