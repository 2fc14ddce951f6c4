use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ChallengeStatus;
use crate::config::RulesConfig;
use crate::error::{EngineError, Result};

/// Challenge plans offered at purchase time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengePlan {
    Starter,
    Pro,
    Elite,
}

impl ChallengePlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengePlan::Starter => "starter",
            ChallengePlan::Pro => "pro",
            ChallengePlan::Elite => "elite",
        }
    }

    pub fn initial_balance(&self) -> Decimal {
        match self {
            ChallengePlan::Starter => Decimal::from(1_000),
            ChallengePlan::Pro => Decimal::from(5_000),
            ChallengePlan::Elite => Decimal::from(10_000),
        }
    }
}

impl std::fmt::Display for ChallengePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChallengePlan {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "elite" => Ok(Self::Elite),
            _ => Err(EngineError::Validation(format!(
                "invalid plan type '{}'; expected starter|pro|elite",
                raw
            ))),
        }
    }
}

/// A funded-account challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub user_id: i64,
    pub plan_type: String,
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub profit_target: Decimal,
    pub max_daily_loss: Decimal,
    pub max_total_loss: Decimal,
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// Realized P&L since creation
    pub fn total_pnl(&self) -> Decimal {
        self.current_balance.saturating_sub(self.initial_balance)
    }

    /// `amount` as a percentage of the initial balance, unrounded.
    /// Saturates at the `Decimal` bounds instead of overflowing.
    pub fn pct_of_initial(&self, amount: Decimal) -> Decimal {
        if self.initial_balance.is_zero() {
            return Decimal::ZERO;
        }
        match amount.checked_div(self.initial_balance) {
            Some(ratio) => ratio.saturating_mul(Decimal::ONE_HUNDRED),
            None if amount.is_sign_negative() == self.initial_balance.is_sign_negative() => {
                Decimal::MAX
            }
            None => Decimal::MIN,
        }
    }

    pub fn total_pnl_pct(&self) -> Decimal {
        self.pct_of_initial(self.total_pnl())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parameters for creating a challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChallenge {
    pub user_id: i64,
    pub plan_type: String,
    pub initial_balance: Decimal,
    pub profit_target: Decimal,
    pub max_daily_loss: Decimal,
    pub max_total_loss: Decimal,
}

impl NewChallenge {
    /// Derive thresholds from a plan's balance and the configured percentages
    pub fn from_plan(user_id: i64, plan: ChallengePlan, rules: &RulesConfig) -> Self {
        let balance = plan.initial_balance();
        let pct = |p: Decimal| balance * p / Decimal::ONE_HUNDRED;

        Self {
            user_id,
            plan_type: plan.as_str().to_string(),
            initial_balance: balance,
            profit_target: pct(rules.profit_target_pct),
            max_daily_loss: pct(rules.max_daily_loss_pct),
            max_total_loss: pct(rules.max_total_loss_pct),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_balance <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }

        for (name, value) in [
            ("profit_target", self.profit_target),
            ("max_daily_loss", self.max_daily_loss),
            ("max_total_loss", self.max_total_loss),
        ] {
            if value <= Decimal::ZERO {
                return Err(EngineError::Validation(format!(
                    "{name} must be a positive amount, got {value}"
                )));
            }
        }

        Ok(())
    }

    /// Materialize the stored record; balance starts at the initial balance
    pub fn into_challenge(self, id: i64, created_at: DateTime<Utc>) -> Challenge {
        Challenge {
            id,
            user_id: self.user_id,
            plan_type: self.plan_type,
            initial_balance: self.initial_balance,
            current_balance: self.initial_balance,
            profit_target: self.profit_target,
            max_daily_loss: self.max_daily_loss,
            max_total_loss: self.max_total_loss,
            status: ChallengeStatus::Active,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_plan_thresholds_follow_policy() {
        let new = NewChallenge::from_plan(1, ChallengePlan::Elite, &RulesConfig::default());
        assert_eq!(new.initial_balance, dec!(10000));
        assert_eq!(new.profit_target, dec!(1000));
        assert_eq!(new.max_daily_loss, dec!(500));
        assert_eq!(new.max_total_loss, dec!(1000));
        assert!(new.validate().is_ok());

        let starter = NewChallenge::from_plan(1, ChallengePlan::Starter, &RulesConfig::default());
        assert_eq!(starter.max_daily_loss, dec!(50));
    }

    #[test]
    fn test_percentages_saturate() {
        let mut c = NewChallenge::from_plan(1, ChallengePlan::Starter, &RulesConfig::default())
            .into_challenge(1, Utc::now());
        c.current_balance = Decimal::MIN + dec!(1000);
        assert_eq!(c.total_pnl(), Decimal::MIN);
        assert_eq!(c.total_pnl_pct(), Decimal::MIN / dec!(10));

        c.initial_balance = dec!(0.01);
        assert_eq!(c.pct_of_initial(Decimal::MIN), Decimal::MIN);
        assert_eq!(c.pct_of_initial(Decimal::MAX), Decimal::MAX);
    }

    #[test]
    fn test_plan_from_str() {
        assert_eq!("PRO".parse::<ChallengePlan>().unwrap(), ChallengePlan::Pro);
        assert_eq!(" elite ".parse::<ChallengePlan>().unwrap(), ChallengePlan::Elite);
        assert!("platinum".parse::<ChallengePlan>().is_err());
    }

    #[test]
    fn test_non_positive_balance_rejected() {
        let mut new = NewChallenge::from_plan(1, ChallengePlan::Pro, &RulesConfig::default());
        new.initial_balance = dec!(0);
        assert!(matches!(new.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_total_pnl_pct_unrounded() {
        let mut challenge = NewChallenge::from_plan(1, ChallengePlan::Elite, &RulesConfig::default())
            .into_challenge(1, Utc::now());
        challenge.current_balance = dec!(10999.999);

        assert_eq!(challenge.total_pnl(), dec!(999.999));
        assert!(challenge.total_pnl_pct() < dec!(10));
        assert_eq!(challenge.status, ChallengeStatus::Active);
    }
}
