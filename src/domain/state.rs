use serde::{Deserialize, Serialize};
use std::fmt;

/// Challenge lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeStatus {
    /// Trading allowed, rules evaluated after every trade
    Active,
    /// Profit target reached
    Passed,
    /// A loss limit was breached
    Failed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "ACTIVE",
            ChallengeStatus::Passed => "PASSED",
            ChallengeStatus::Failed => "FAILED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: ChallengeStatus) -> bool {
        use ChallengeStatus::*;

        matches!((self, target), (Active, Passed) | (Active, Failed))
    }

    /// PASSED and FAILED are final; nothing moves a challenge out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChallengeStatus::Passed | ChallengeStatus::Failed)
    }

    pub fn can_trade(&self) -> bool {
        matches!(self, ChallengeStatus::Active)
    }
}

impl Default for ChallengeStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ChallengeStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(ChallengeStatus::Active),
            "PASSED" => Ok(ChallengeStatus::Passed),
            "FAILED" => Ok(ChallengeStatus::Failed),
            _ => Err(format!("Unknown challenge status: {}", s)),
        }
    }
}

/// Which rule ended the challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    ProfitTarget,
    MaxTotalLoss,
    MaxDailyLoss,
}

impl TransitionReason {
    pub fn target_status(&self) -> ChallengeStatus {
        match self {
            TransitionReason::ProfitTarget => ChallengeStatus::Passed,
            TransitionReason::MaxTotalLoss | TransitionReason::MaxDailyLoss => {
                ChallengeStatus::Failed
            }
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionReason::ProfitTarget => write!(f, "profit target"),
            TransitionReason::MaxTotalLoss => write!(f, "max total loss"),
            TransitionReason::MaxDailyLoss => write!(f, "max daily loss"),
        }
    }
}

/// Status transition event (for logging/auditing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub challenge_id: i64,
    pub from: ChallengeStatus,
    pub to: ChallengeStatus,
    pub reason: TransitionReason,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StatusTransition {
    pub fn new(challenge_id: i64, from: ChallengeStatus, reason: TransitionReason) -> Self {
        Self {
            challenge_id,
            from,
            to: reason.target_status(),
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}
