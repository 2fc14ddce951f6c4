//! Challenge rule evaluation
//!
//! `RuleEvaluator` turns a challenge's balance and today's trades into a
//! status decision. `TradeDesk` records trades and re-evaluates under the same
//! per-challenge lock, so a challenge never sees two terminal transitions.

mod daily;
mod desk;
mod evaluator;
mod locks;
mod report;

pub use daily::{day_start, DailyPnlAggregator};
pub use desk::{TradeDesk, TradeOutcome, TradeTicket};
pub use evaluator::{check_rules, RuleEvaluator};
pub use locks::{ChallengeGuard, ChallengeLocks};
pub use report::{
    BalanceMetrics, ChallengeMetrics, EvaluationReport, LossMetrics, TargetMetrics, TradeStats,
};
