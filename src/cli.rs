use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapters::{PostgresStore, YahooQuoteFetcher};
use crate::config::AppConfig;
use crate::domain::{ChallengePlan, NewChallenge, QuoteResponse, TradeSide};
use crate::engine::{RuleEvaluator, TradeDesk, TradeTicket};
use crate::error::{EngineError, Result};
use crate::ledger::{ChallengeStore, InMemoryStore, TradeLedger};
use crate::market::QuoteService;
use crate::services::Metrics;

#[derive(Parser)]
#[command(name = "challenge-engine")]
#[command(version = "0.1.0")]
#[command(about = "Funded-account challenge rules and cached market quotes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "CHALLENGE_CONFIG_DIR")]
    pub config: String,

    /// Use a throwaway in-process store instead of PostgreSQL
    #[arg(long)]
    pub memory: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply database migrations
    Migrate,
    /// Open a new challenge for a user
    Create {
        #[arg(long)]
        user: i64,
        /// starter | pro | elite
        #[arg(long)]
        plan: ChallengePlan,
    },
    /// Record a trade and re-evaluate the challenge
    Trade {
        #[arg(long)]
        challenge: i64,
        #[arg(long)]
        symbol: String,
        /// buy | sell
        #[arg(long)]
        side: TradeSide,
        #[arg(long)]
        quantity: Decimal,
        #[arg(long)]
        price: Decimal,
    },
    /// Run the challenge rules now
    Evaluate {
        #[arg(long)]
        challenge: i64,
    },
    /// Show balance, loss buffers and target progress
    Metrics {
        #[arg(long)]
        challenge: i64,
    },
    /// Fetch quotes for one or more symbols
    Quote {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Keep the configured watchlist warm in the quote cache until Ctrl-C
    Serve,
}

/// Store handles shared by the evaluator and the desk
pub struct Stores {
    pub challenges: Arc<dyn ChallengeStore>,
    pub trades: Arc<dyn TradeLedger>,
}

pub async fn open_stores(config: &AppConfig, memory: bool) -> Result<Stores> {
    if memory {
        let store = Arc::new(InMemoryStore::new());
        return Ok(Stores {
            challenges: store.clone(),
            trades: store,
        });
    }

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    Ok(Stores {
        challenges: store.clone(),
        trades: store,
    })
}

pub fn quote_service(config: &AppConfig, metrics: Arc<Metrics>) -> Result<QuoteService> {
    let fetcher = Arc::new(YahooQuoteFetcher::from_config(&config.quotes)?);
    Ok(QuoteService::new(&config.quotes, fetcher, metrics))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a one-shot command; `Serve` is handled by the binary
pub async fn run_command(command: Commands, config: &AppConfig, memory: bool) -> Result<()> {
    let metrics = Arc::new(Metrics::new());

    match command {
        Commands::Migrate => {
            let store =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
            println!("Migrations applied");
        }
        Commands::Create { user, plan } => {
            let stores = open_stores(config, memory).await?;
            let challenge = stores
                .challenges
                .insert(NewChallenge::from_plan(user, plan, &config.rules))
                .await?;
            print_json(&challenge)?;
        }
        Commands::Trade {
            challenge,
            symbol,
            side,
            quantity,
            price,
        } => {
            let stores = open_stores(config, memory).await?;
            let evaluator = Arc::new(
                RuleEvaluator::new(stores.challenges, stores.trades, config.rules.clone())
                    .with_metrics(metrics.clone()),
            );
            let desk = TradeDesk::new(evaluator).with_metrics(metrics);
            let ticket = TradeTicket {
                symbol,
                side,
                quantity,
                price,
            };
            print_json(&desk.execute(challenge, ticket).await?)?;
        }
        Commands::Evaluate { challenge } => {
            let stores = open_stores(config, memory).await?;
            let evaluator =
                RuleEvaluator::new(stores.challenges, stores.trades, config.rules.clone())
                    .with_metrics(metrics);
            print_json(&evaluator.evaluate(challenge).await?)?;
        }
        Commands::Metrics { challenge } => {
            let stores = open_stores(config, memory).await?;
            let evaluator =
                RuleEvaluator::new(stores.challenges, stores.trades, config.rules.clone());
            print_json(&evaluator.metrics(challenge).await?)?;
        }
        Commands::Quote { symbols } => {
            let service = quote_service(config, metrics)?;
            let quotes: BTreeMap<String, QuoteResponse> =
                service.get_quotes(&symbols).await?.into_iter().collect();
            print_json(&quotes)?;
        }
        Commands::Serve => {
            return Err(EngineError::Internal(
                "serve is a long-running mode, start it from the binary".into(),
            ));
        }
    }

    Ok(())
}
