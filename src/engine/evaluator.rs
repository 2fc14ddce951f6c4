use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    ChallengeLocks, ChallengeMetrics, DailyPnlAggregator, EvaluationReport, TradeStats,
};
use crate::config::RulesConfig;
use crate::domain::{Challenge, StatusTransition, TransitionReason};
use crate::error::{EngineError, Result};
use crate::ledger::{ChallengeStore, TradeLedger};
use crate::services::Metrics;

/// Lost compare-and-set races tolerated before giving up
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Apply the challenge rules in precedence order: profit target, total loss,
/// daily loss. All inputs are unrounded.
pub fn check_rules(
    challenge: &Challenge,
    daily_pnl: Decimal,
    rules: &RulesConfig,
) -> Option<TransitionReason> {
    if challenge.total_pnl_pct() >= rules.profit_target_pct {
        return Some(TransitionReason::ProfitTarget);
    }
    if challenge.total_pnl() <= -challenge.max_total_loss {
        return Some(TransitionReason::MaxTotalLoss);
    }
    if daily_pnl <= -challenge.max_daily_loss {
        return Some(TransitionReason::MaxDailyLoss);
    }
    None
}

fn transition_message(challenge: &Challenge, reason: TransitionReason) -> String {
    match reason {
        TransitionReason::ProfitTarget => "Profit target reached! Challenge PASSED".to_string(),
        TransitionReason::MaxTotalLoss => format!(
            "Max total loss ({}) exceeded. Challenge FAILED",
            challenge.max_total_loss
        ),
        TransitionReason::MaxDailyLoss => format!(
            "Max daily loss ({}) exceeded. Challenge FAILED",
            challenge.max_daily_loss
        ),
    }
}

/// Decides PASSED/FAILED/ACTIVE for a challenge and persists terminal transitions
pub struct RuleEvaluator {
    store: Arc<dyn ChallengeStore>,
    ledger: Arc<dyn TradeLedger>,
    daily: DailyPnlAggregator,
    rules: RulesConfig,
    locks: Arc<ChallengeLocks>,
    metrics: Arc<Metrics>,
}

impl RuleEvaluator {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        ledger: Arc<dyn TradeLedger>,
        rules: RulesConfig,
    ) -> Self {
        let daily = DailyPnlAggregator::new(ledger.clone(), rules.daily_pnl_scope);
        Self {
            store,
            ledger,
            daily,
            rules,
            locks: Arc::new(ChallengeLocks::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn locks(&self) -> Arc<ChallengeLocks> {
        Arc::clone(&self.locks)
    }

    pub fn store(&self) -> Arc<dyn ChallengeStore> {
        Arc::clone(&self.store)
    }

    pub async fn evaluate(&self, challenge_id: i64) -> Result<EvaluationReport> {
        self.evaluate_at(challenge_id, Utc::now()).await
    }

    /// Evaluate with the UTC day taken from `as_of`
    pub async fn evaluate_at(
        &self,
        challenge_id: i64,
        as_of: DateTime<Utc>,
    ) -> Result<EvaluationReport> {
        let _guard = self.locks.acquire(challenge_id).await;
        self.evaluate_locked(challenge_id, as_of).await
    }

    /// Caller must hold the challenge's lock
    #[instrument(skip(self))]
    pub(crate) async fn evaluate_locked(
        &self,
        challenge_id: i64,
        as_of: DateTime<Utc>,
    ) -> Result<EvaluationReport> {
        self.metrics.inc_evaluations();

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let challenge = self.store.load(challenge_id).await?;
            let daily_pnl = self.daily.daily_pnl(challenge_id, as_of).await?;

            if challenge.is_terminal() {
                debug!(challenge_id, status = %challenge.status, "Challenge already final");
                let message = format!("Challenge already {}", challenge.status);
                return Ok(EvaluationReport::new(&challenge, daily_pnl, message));
            }

            if challenge.initial_balance <= Decimal::ZERO {
                debug_assert!(false, "challenge {challenge_id} has non-positive initial balance");
                return Err(EngineError::Internal(format!(
                    "challenge {} has non-positive initial balance {}",
                    challenge_id, challenge.initial_balance
                )));
            }

            let Some(reason) = check_rules(&challenge, daily_pnl, &self.rules) else {
                return Ok(EvaluationReport::new(
                    &challenge,
                    daily_pnl,
                    "Challenge is active",
                ));
            };

            let transition = StatusTransition::new(challenge_id, challenge.status, reason);
            if !transition.from.can_transition_to(transition.to) {
                return Err(EngineError::Internal(format!(
                    "challenge {} cannot move from {} to {}",
                    challenge_id, transition.from, transition.to
                )));
            }
            let mut updated = challenge.clone();
            updated.status = transition.to;

            match self.store.save(&updated).await {
                Ok(()) => {
                    self.metrics.inc_terminal_transitions();
                    info!(
                        challenge_id,
                        from = %transition.from,
                        to = %transition.to,
                        reason = %transition.reason,
                        balance = %updated.current_balance,
                        "Challenge status changed"
                    );
                    let message = transition_message(&updated, reason);
                    return Ok(EvaluationReport::new(&updated, daily_pnl, message));
                }
                Err(EngineError::InvalidState(msg)) => {
                    warn!(challenge_id, attempt, %msg, "Status write lost a race, reloading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::Internal(format!(
            "challenge {} kept changing during evaluation",
            challenge_id
        )))
    }

    /// Dashboard metrics with lifetime trade counts; never mutates status
    pub async fn metrics(&self, challenge_id: i64) -> Result<ChallengeMetrics> {
        self.metrics_at(challenge_id, Utc::now()).await
    }

    pub async fn metrics_at(
        &self,
        challenge_id: i64,
        as_of: DateTime<Utc>,
    ) -> Result<ChallengeMetrics> {
        let challenge = self.store.load(challenge_id).await?;
        let daily_pnl = self.daily.daily_pnl(challenge_id, as_of).await?;
        let trades = self
            .ledger
            .list_trades(challenge_id, DateTime::<Utc>::UNIX_EPOCH)
            .await?;
        Ok(ChallengeMetrics::new(
            &challenge,
            daily_pnl,
            TradeStats::from_trades(&trades),
        ))
    }
}
