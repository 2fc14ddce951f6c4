//! Challenge evaluation against the in-process store

use challenge_engine::config::RulesConfig;
use challenge_engine::domain::{
    ChallengePlan, ChallengeStatus, DailyPnlScope, NewChallenge, NewTrade, TradeSide,
};
use challenge_engine::engine::{RuleEvaluator, TradeDesk, TradeTicket};
use challenge_engine::error::EngineError;
use challenge_engine::ledger::{ChallengeStore, InMemoryStore};
use challenge_engine::services::Metrics;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;

struct Harness {
    store: Arc<InMemoryStore>,
    evaluator: Arc<RuleEvaluator>,
    desk: Arc<TradeDesk>,
    metrics: Arc<Metrics>,
}

fn harness(rules: RulesConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(Metrics::new());
    let evaluator = Arc::new(
        RuleEvaluator::new(store.clone(), store.clone(), rules).with_metrics(metrics.clone()),
    );
    let desk = Arc::new(TradeDesk::new(evaluator.clone()).with_metrics(metrics.clone()));
    Harness {
        store,
        evaluator,
        desk,
        metrics,
    }
}

async fn open(h: &Harness, plan: ChallengePlan) -> i64 {
    h.store
        .insert(NewChallenge::from_plan(1, plan, &RulesConfig::default()))
        .await
        .unwrap()
        .id
}

/// Move the balance with a trade booked yesterday, so today's P&L stays flat
async fn book_yesterday(h: &Harness, id: i64, side: TradeSide, amount: Decimal) {
    h.store
        .record_trade(NewTrade::fill(
            id,
            "HIST",
            side,
            Decimal::ONE,
            amount,
            Utc::now() - Duration::days(1),
        )
        .unwrap())
        .await
        .unwrap();
}

fn buy(quantity: Decimal, price: Decimal) -> TradeTicket {
    TradeTicket {
        symbol: "SPY".into(),
        side: TradeSide::Buy,
        quantity,
        price,
    }
}

#[tokio::test]
async fn ten_percent_gain_passes() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;
    book_yesterday(&h, id, TradeSide::Sell, dec!(1000)).await;

    let report = h.evaluator.evaluate(id).await.unwrap();
    assert_eq!(report.status, ChallengeStatus::Passed);
    assert_eq!(report.total_pnl_pct, dec!(10.00));
    assert_eq!(report.balance, dec!(11000));
}

#[tokio::test]
async fn ten_percent_total_loss_fails() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;
    book_yesterday(&h, id, TradeSide::Buy, dec!(1000)).await;

    let report = h.evaluator.evaluate(id).await.unwrap();
    assert_eq!(report.status, ChallengeStatus::Failed);
    assert_eq!(report.total_pnl, dec!(-1000.00));
    assert_eq!(report.daily_pnl, dec!(0));
    assert!(report.message.contains("total loss"));
}

#[tokio::test]
async fn daily_loss_fails_within_total_bound() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;

    let outcome = h.desk.execute(id, buy(dec!(5), dec!(100))).await.unwrap();
    assert_eq!(outcome.evaluation.status, ChallengeStatus::Failed);
    assert_eq!(outcome.evaluation.daily_pnl, dec!(-500.00));
    assert_eq!(outcome.evaluation.total_pnl, dec!(-500.00));
    assert!(outcome.evaluation.message.contains("daily loss"));
}

#[tokio::test]
async fn yesterdays_losses_do_not_count_today() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;
    book_yesterday(&h, id, TradeSide::Buy, dec!(499)).await;
    book_yesterday(&h, id, TradeSide::Buy, dec!(400)).await;

    let report = h.evaluator.evaluate(id).await.unwrap();
    assert_eq!(report.status, ChallengeStatus::Active);
    assert_eq!(report.daily_pnl, dec!(0));
    assert_eq!(report.total_pnl, dec!(-899));
}

#[tokio::test]
async fn closed_only_scope_ignores_open_buys() {
    let rules = RulesConfig {
        daily_pnl_scope: DailyPnlScope::ClosedOnly,
        ..RulesConfig::default()
    };
    let h = harness(rules);
    let id = open(&h, ChallengePlan::Elite).await;

    let outcome = h.desk.execute(id, buy(dec!(5), dec!(100))).await.unwrap();
    assert_eq!(outcome.evaluation.status, ChallengeStatus::Active);
    assert_eq!(outcome.evaluation.daily_pnl, dec!(0));
}

#[tokio::test]
async fn terminal_evaluation_is_idempotent() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Pro).await;
    book_yesterday(&h, id, TradeSide::Sell, dec!(600)).await;

    let first = h.evaluator.evaluate(id).await.unwrap();
    let second = h.evaluator.evaluate(id).await.unwrap();
    let third = h.evaluator.evaluate(id).await.unwrap();

    assert_eq!(first.status, ChallengeStatus::Passed);
    assert_eq!(second, third);
    assert_eq!(second.status, first.status);
    assert_eq!(second.balance, first.balance);
    assert_eq!(h.metrics.terminal_transitions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_trades_commit_one_transition() {
    let h = harness(RulesConfig::default());
    // Starter: 1000 balance, daily limit 50
    let id = open(&h, ChallengePlan::Starter).await;

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let desk = h.desk.clone();
            tokio::spawn(async move { desk.execute(id, buy(dec!(1), dec!(10))).await })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::InvalidState(_)) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 15);
    assert_eq!(h.store.trade_count(id).await, 5);
    assert_eq!(h.metrics.terminal_transitions.load(Ordering::SeqCst), 1);

    let stored = h.store.load(id).await.unwrap();
    assert_eq!(stored.status, ChallengeStatus::Failed);
    assert_eq!(stored.current_balance, dec!(950));
}

#[tokio::test]
async fn concurrent_evaluations_commit_one_transition() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;
    book_yesterday(&h, id, TradeSide::Sell, dec!(1500)).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let evaluator = h.evaluator.clone();
            tokio::spawn(async move { evaluator.evaluate(id).await })
        })
        .collect();

    for task in tasks {
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.status, ChallengeStatus::Passed);
    }
    assert_eq!(h.metrics.terminal_transitions.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.evaluations.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn metrics_view_does_not_transition() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;
    book_yesterday(&h, id, TradeSide::Buy, dec!(2000)).await;

    let metrics = h.evaluator.metrics(id).await.unwrap();
    assert_eq!(metrics.status, ChallengeStatus::Active);
    assert_eq!(metrics.total.remaining_loss_buffer, dec!(-1000));
    assert_eq!(metrics.target.profit_needed, dec!(3000));
    assert_eq!(metrics.trades.total_trades, 1);
    assert_eq!(metrics.trades.losing_trades, 1);
    assert_eq!(metrics.trades.winning_trades, 0);
    assert_eq!(
        h.store.load(id).await.unwrap().status,
        ChallengeStatus::Active
    );
}

#[tokio::test]
async fn unknown_challenge_is_not_found() {
    let h = harness(RulesConfig::default());
    assert!(matches!(
        h.evaluator.evaluate(404).await,
        Err(EngineError::NotFound { challenge_id: 404 })
    ));
    assert!(matches!(
        h.desk.execute(404, buy(dec!(1), dec!(1))).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn lock_table_does_not_grow_with_unknown_ids() {
    let h = harness(RulesConfig::default());
    for id in 1000..3000 {
        assert!(h.evaluator.evaluate(id).await.is_err());
    }
    assert!(h.desk.execute(5000, buy(dec!(1), dec!(1))).await.is_err());
    assert_eq!(h.evaluator.locks().tracked(), 0);

    let id = open(&h, ChallengePlan::Pro).await;
    h.desk.execute(id, buy(dec!(1), dec!(1))).await.unwrap();
    h.evaluator.evaluate(id).await.unwrap();
    assert_eq!(h.evaluator.locks().tracked(), 0);
}

#[tokio::test]
async fn out_of_range_trade_is_rejected_without_side_effects() {
    let h = harness(RulesConfig::default());
    let id = open(&h, ChallengePlan::Elite).await;
    let huge = Decimal::from_scientific("1e20").unwrap();

    let err = h.desk.execute(id, buy(huge, huge)).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.store.trade_count(id).await, 0);
    assert_eq!(
        h.store.load(id).await.unwrap().status,
        ChallengeStatus::Active
    );
}
