use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::DailyPnlScope;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub quotes: QuoteConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    /// Lifetime of a cached quote
    pub ttl_secs: u64,
    /// Period of the background sweep over expired entries
    pub sweep_interval_secs: u64,
    /// Budget for a single provider call on a cache miss
    pub fetch_timeout_ms: u64,
    /// Market-data provider base URL
    pub base_url: String,
    /// Maximum symbols accepted by one batch lookup
    pub max_batch: usize,
    /// Symbols `serve` keeps warm, refreshed once per TTL
    #[serde(default)]
    pub watchlist: Vec<String>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10,
            sweep_interval_secs: 30,
            fetch_timeout_ms: 5000,
            base_url: "https://query1.finance.yahoo.com".to_string(),
            max_batch: 10,
            watchlist: Vec::new(),
        }
    }
}

impl QuoteConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Challenge rule thresholds, as percentages of the initial balance
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// Profit target (e.g., 10 = +10%)
    pub profit_target_pct: Decimal,
    /// Maximum loss within one UTC day (e.g., 5 = -5%)
    pub max_daily_loss_pct: Decimal,
    /// Maximum loss over the life of the challenge (e.g., 10 = -10%)
    pub max_total_loss_pct: Decimal,
    /// Which trades count toward the daily P&L
    #[serde(default)]
    pub daily_pnl_scope: DailyPnlScope,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            profit_target_pct: Decimal::from(10),
            max_daily_loss_pct: Decimal::from(5),
            max_total_loss_pct: Decimal::from(10),
            daily_pnl_scope: DailyPnlScope::All,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("database.url", "postgres://localhost/challenges")?
            .set_default("database.max_connections", 5)?
            .set_default("quotes.ttl_secs", 10)?
            .set_default("quotes.sweep_interval_secs", 30)?
            .set_default("quotes.fetch_timeout_ms", 5000)?
            .set_default("quotes.base_url", "https://query1.finance.yahoo.com")?
            .set_default("quotes.max_batch", 10)?
            .set_default("rules.profit_target_pct", 10)?
            .set_default("rules.max_daily_loss_pct", 5)?
            .set_default("rules.max_total_loss_pct", 10)?
            .set_default("rules.daily_pnl_scope", "all")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CHALLENGE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CHALLENGE_QUOTES__TTL_SECS, etc.)
            .add_source(
                Environment::with_prefix("CHALLENGE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("quotes.watchlist")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/challenges".to_string(),
                max_connections: default_max_connections(),
            },
            quotes: QuoteConfig::default(),
            rules: RulesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.quotes.ttl_secs == 0 {
            errors.push("quotes.ttl_secs must be positive".to_string());
        }

        if self.quotes.sweep_interval_secs == 0 {
            errors.push("quotes.sweep_interval_secs must be positive".to_string());
        }

        if self.quotes.fetch_timeout_ms == 0 {
            errors.push("quotes.fetch_timeout_ms must be positive".to_string());
        }

        if self.quotes.max_batch == 0 {
            errors.push("quotes.max_batch must be positive".to_string());
        }

        if self.quotes.watchlist.len() > self.quotes.max_batch {
            errors.push(format!(
                "quotes.watchlist has {} symbols, more than quotes.max_batch ({})",
                self.quotes.watchlist.len(),
                self.quotes.max_batch
            ));
        }

        for (name, pct) in [
            ("profit_target_pct", self.rules.profit_target_pct),
            ("max_daily_loss_pct", self.rules.max_daily_loss_pct),
            ("max_total_loss_pct", self.rules.max_total_loss_pct),
        ] {
            if pct <= Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                errors.push(format!("rules.{name} must be in (0, 100], got {pct}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
