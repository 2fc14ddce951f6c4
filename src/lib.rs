pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod market;
pub mod services;

pub use config::AppConfig;
pub use domain::{
    Challenge, ChallengePlan, ChallengeStatus, DailyPnlScope, QuoteResponse, QuoteSnapshot, Trade,
    TradeSide,
};
pub use engine::{ChallengeMetrics, EvaluationReport, RuleEvaluator, TradeDesk, TradeTicket};
pub use error::{EngineError, Result};
pub use ledger::{ChallengeStore, InMemoryStore, TradeLedger};
pub use market::{QuoteCache, QuoteFetcher, QuoteService};
pub use services::Metrics;
