use anyhow::{bail, Context};
use challenge_engine::cli::{self, Cli, Commands};
use challenge_engine::config::{AppConfig, LoggingConfig};
use challenge_engine::error::Result;
use challenge_engine::services::Metrics;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config: {}", e);
        }
        bail!("invalid configuration: {}", errors.join("; "));
    }

    match cli.command {
        Commands::Serve => {
            init_logging(&config.logging);
            run_serve(&config).await.context("quote service failed")?;
        }
        command => {
            init_logging_simple();
            if let Err(e) = cli::run_command(command, &config, cli.memory).await {
                error!("{}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Keep the watchlist warm in the quote cache until Ctrl-C, then stop the
/// janitor cleanly. With an empty watchlist only the sweep runs.
async fn run_serve(config: &AppConfig) -> Result<()> {
    let metrics = Arc::new(Metrics::new());
    let quotes = cli::quote_service(config, metrics.clone())?;
    quotes.start().await;
    info!(
        "Quote service running (ttl: {}s, sweep: {}s, watchlist: {:?})",
        config.quotes.ttl_secs, config.quotes.sweep_interval_secs, config.quotes.watchlist
    );

    let watchlist = &config.quotes.watchlist;
    let mut refresh = tokio::time::interval(config.quotes.ttl());
    let mut status = tokio::time::interval(Duration::from_secs(60));
    status.tick().await;

    loop {
        tokio::select! {
            _ = refresh.tick(), if !watchlist.is_empty() => {
                match quotes.refresh(watchlist).await {
                    Ok(0) => {}
                    Ok(failed) => warn!(failed, "Watchlist refresh incomplete"),
                    Err(e) => warn!("Watchlist refresh rejected: {}", e),
                }
            }
            _ = status.tick() => metrics.log_status(),
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    quotes.stop().await;
    metrics.log_status();
    Ok(())
}

/// Initialize logging with console output and optional daily file rotation
fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},challenge_engine=debug,sqlx=warn", logging.level))
    });

    let log_dir = std::env::var("CHALLENGE_LOG_DIR")
        .ok()
        .or_else(|| logging.dir.clone());

    // tracing_appender::rolling::daily panics if the first file cannot be
    // created, so check the directory is writable first.
    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("Warning: Could not create log directory {} ({}), file logging disabled", dir, e);
            return None;
        }
        let test_file = std::path::Path::new(&dir).join(".challenge_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&test_file) {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_file);
                let appender = tracing_appender::rolling::daily(&dir, "challenge-engine.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // Flushes on drop; the process keeps it for its whole life
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let json_layer = logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
