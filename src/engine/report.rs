use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{round_cents, Challenge, ChallengeStatus, Trade};

/// Outcome of one evaluation
///
/// Amounts and percentages are rounded for display only; every threshold
/// comparison happens on the unrounded values before this is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub status: ChallengeStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pnl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pnl_pct: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_pnl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_pnl_pct: Decimal,
    pub message: String,
}

impl EvaluationReport {
    pub fn new(challenge: &Challenge, daily_pnl: Decimal, message: impl Into<String>) -> Self {
        Self {
            status: challenge.status,
            balance: challenge.current_balance,
            total_pnl: round_cents(challenge.total_pnl()),
            total_pnl_pct: round_cents(challenge.total_pnl_pct()),
            daily_pnl: round_cents(daily_pnl),
            daily_pnl_pct: round_cents(challenge.pct_of_initial(daily_pnl)),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceMetrics {
    #[serde(with = "rust_decimal::serde::float")]
    pub starting: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
}

/// P&L against a loss limit, for either the whole challenge or today
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossMetrics {
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_pct: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_loss_allowed: Decimal,
    /// How much more can be lost before the limit trips
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_loss_buffer: Decimal,
}

impl LossMetrics {
    fn new(challenge: &Challenge, pnl: Decimal, max_loss: Decimal) -> Self {
        Self {
            pnl: round_cents(pnl),
            pnl_pct: round_cents(challenge.pct_of_initial(pnl)),
            max_loss_allowed: max_loss,
            remaining_loss_buffer: round_cents(max_loss.saturating_add(pnl)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    #[serde(with = "rust_decimal::serde::float")]
    pub profit_needed: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit_target: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub progress_pct: Decimal,
}

/// Trade counts over the life of a challenge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

impl TradeStats {
    /// Flat trades count toward the total only
    pub fn from_trades(trades: &[Trade]) -> Self {
        Self {
            total_trades: trades.len(),
            winning_trades: trades.iter().filter(|t| t.profit_loss > Decimal::ZERO).count(),
            losing_trades: trades.iter().filter(|t| t.profit_loss < Decimal::ZERO).count(),
        }
    }
}

/// Read-only dashboard view of a challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeMetrics {
    pub challenge_id: i64,
    pub status: ChallengeStatus,
    pub balance: BalanceMetrics,
    pub total: LossMetrics,
    pub daily: LossMetrics,
    pub target: TargetMetrics,
    pub trades: TradeStats,
}

impl ChallengeMetrics {
    pub fn new(challenge: &Challenge, daily_pnl: Decimal, trades: TradeStats) -> Self {
        let total_pnl = challenge.total_pnl();
        let progress_pct = if challenge.profit_target > Decimal::ZERO {
            let ratio = total_pnl
                .checked_div(challenge.profit_target)
                .unwrap_or(if total_pnl.is_sign_negative() {
                    Decimal::MIN
                } else {
                    Decimal::MAX
                });
            round_cents(ratio.saturating_mul(Decimal::ONE_HUNDRED))
        } else {
            Decimal::ZERO
        };

        Self {
            challenge_id: challenge.id,
            status: challenge.status,
            balance: BalanceMetrics {
                starting: challenge.initial_balance,
                current: challenge.current_balance,
            },
            total: LossMetrics::new(challenge, total_pnl, challenge.max_total_loss),
            daily: LossMetrics::new(challenge, daily_pnl, challenge.max_daily_loss),
            target: TargetMetrics {
                profit_needed: round_cents(challenge.profit_target.saturating_sub(total_pnl)),
                profit_target: challenge.profit_target,
                progress_pct,
            },
            trades,
        }
    }
}
