use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::domain::{
    Challenge, ChallengeStatus, NewChallenge, NewTrade, Trade, TradeSide, TradeStatus,
};
use crate::error::{EngineError, Result};
use crate::ledger::{ChallengeStore, TradeLedger};

const CHALLENGE_COLUMNS: &str = "id, user_id, plan_type, initial_balance, current_balance, \
     profit_target, max_daily_loss, max_total_loss, status, created_at";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Explain why a conditional write matched no row
    async fn rejection(&self, challenge_id: i64, expected_balance: Option<Decimal>) -> EngineError {
        match self.load(challenge_id).await {
            Ok(stored) if stored.is_terminal() => EngineError::InvalidState(format!(
                "challenge {} is already {}",
                challenge_id, stored.status
            )),
            Ok(stored) => match expected_balance {
                Some(expected) if expected != stored.current_balance => {
                    EngineError::InvalidState(format!(
                        "challenge {} balance moved from {} to {}",
                        challenge_id, expected, stored.current_balance
                    ))
                }
                _ => EngineError::InvalidState(format!(
                    "challenge {} changed concurrently",
                    challenge_id
                )),
            },
            Err(e) => e,
        }
    }
}

fn challenge_from_row(row: &PgRow) -> Result<Challenge> {
    let status: String = row.try_get("status")?;
    Ok(Challenge {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        plan_type: row.try_get("plan_type")?,
        initial_balance: row.try_get("initial_balance")?,
        current_balance: row.try_get("current_balance")?,
        profit_target: row.try_get("profit_target")?,
        max_daily_loss: row.try_get("max_daily_loss")?,
        max_total_loss: row.try_get("max_total_loss")?,
        status: ChallengeStatus::try_from(status.as_str()).map_err(EngineError::Internal)?,
        created_at: row.try_get("created_at")?,
    })
}

fn trade_from_row(row: &PgRow) -> Result<Trade> {
    let side: String = row.try_get("side")?;
    let status: String = row.try_get("status")?;
    Ok(Trade {
        id: row.try_get("id")?,
        challenge_id: row.try_get("challenge_id")?,
        symbol: row.try_get("symbol")?,
        side: side
            .parse::<TradeSide>()
            .map_err(|e| EngineError::Internal(e.to_string()))?,
        quantity: row.try_get("quantity")?,
        entry_price: row.try_get("entry_price")?,
        exit_price: row.try_get("exit_price")?,
        profit_loss: row.try_get("profit_loss")?,
        status: status.parse::<TradeStatus>()?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ChallengeStore for PostgresStore {
    #[instrument(skip(self))]
    async fn load(&self, challenge_id: i64) -> Result<Challenge> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM challenges WHERE id = $1",
            CHALLENGE_COLUMNS
        ))
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => challenge_from_row(&r),
            None => Err(EngineError::not_found(challenge_id)),
        }
    }

    #[instrument(skip(self))]
    async fn insert(&self, challenge: NewChallenge) -> Result<Challenge> {
        challenge.validate()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO challenges (user_id, plan_type, initial_balance, current_balance,
                                    profit_target, max_daily_loss, max_total_loss, status)
            VALUES ($1, $2, $3, $3, $4, $5, $6, 'ACTIVE')
            RETURNING {}
            "#,
            CHALLENGE_COLUMNS
        ))
        .bind(challenge.user_id)
        .bind(&challenge.plan_type)
        .bind(challenge.initial_balance)
        .bind(challenge.profit_target)
        .bind(challenge.max_daily_loss)
        .bind(challenge.max_total_loss)
        .fetch_one(&self.pool)
        .await?;

        let created = challenge_from_row(&row)?;
        debug!(challenge_id = created.id, "Inserted challenge");
        Ok(created)
    }

    #[instrument(skip(self, challenge), fields(challenge_id = challenge.id, status = %challenge.status))]
    async fn save(&self, challenge: &Challenge) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE challenges
            SET status = $1, current_balance = $2
            WHERE id = $3 AND status = 'ACTIVE' AND current_balance = $2
            "#,
        )
        .bind(challenge.status.as_str())
        .bind(challenge.current_balance)
        .bind(challenge.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .rejection(challenge.id, Some(challenge.current_balance))
                .await);
        }
        Ok(())
    }

    #[instrument(skip(self, trade), fields(challenge_id = trade.challenge_id, symbol = %trade.symbol))]
    async fn record_trade(&self, trade: NewTrade) -> Result<(Trade, Challenge)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE challenges
            SET current_balance = current_balance + $1
            WHERE id = $2 AND status = 'ACTIVE'
            RETURNING {}
            "#,
            CHALLENGE_COLUMNS
        ))
        .bind(trade.profit_loss)
        .bind(trade.challenge_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(self.rejection(trade.challenge_id, None).await);
        };
        let challenge = challenge_from_row(&row)?;

        let row = sqlx::query(
            r#"
            INSERT INTO trades (challenge_id, symbol, side, quantity, entry_price,
                                exit_price, profit_loss, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, challenge_id, symbol, side, quantity, entry_price,
                      exit_price, profit_loss, status, created_at
            "#,
        )
        .bind(trade.challenge_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.profit_loss)
        .bind(trade.status.as_str())
        .bind(trade.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let trade = trade_from_row(&row)?;

        tx.commit().await?;
        Ok((trade, challenge))
    }
}

#[async_trait]
impl TradeLedger for PostgresStore {
    #[instrument(skip(self))]
    async fn list_trades(&self, challenge_id: i64, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, challenge_id, symbol, side, quantity, entry_price,
                   exit_price, profit_loss, status, created_at
            FROM trades
            WHERE challenge_id = $1 AND created_at >= $2
            ORDER BY created_at
            "#,
        )
        .bind(challenge_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }
}
