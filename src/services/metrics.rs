use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

/// Counters for the evaluator and the quote cache
pub struct Metrics {
    /// Quote lookups served from cache
    pub cache_hits: AtomicU64,
    /// Quote lookups that went to the provider
    pub cache_misses: AtomicU64,
    /// Provider calls that failed or timed out
    pub fetch_failures: AtomicU64,
    /// Entries removed by the background sweep
    pub entries_swept: AtomicU64,
    /// Evaluations run (including terminal no-ops)
    pub evaluations: AtomicU64,
    /// Challenges moved to PASSED or FAILED
    pub terminal_transitions: AtomicU64,
    /// Trades recorded through the desk
    pub trades_recorded: AtomicU64,
    /// Unix timestamp of the last counter change
    last_update: AtomicI64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            entries_swept: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            terminal_transitions: AtomicU64::new(0),
            trades_recorded: AtomicU64::new(0),
            last_update: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    fn bump(&self, counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
        self.last_update
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.bump(&self.cache_hits, 1);
    }

    pub fn inc_cache_misses(&self) {
        self.bump(&self.cache_misses, 1);
    }

    pub fn inc_fetch_failures(&self) {
        self.bump(&self.fetch_failures, 1);
    }

    pub fn add_entries_swept(&self, n: usize) {
        self.bump(&self.entries_swept, n as u64);
    }

    pub fn inc_evaluations(&self) {
        self.bump(&self.evaluations, 1);
    }

    pub fn inc_terminal_transitions(&self) {
        self.bump(&self.terminal_transitions, 1);
    }

    pub fn inc_trades_recorded(&self) {
        self.bump(&self.trades_recorded, 1);
    }

    /// Share of quote lookups answered from cache, in percent
    pub fn hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Get current metrics as a formatted string
    pub fn summary(&self) -> String {
        format!(
            r#"
=== CHALLENGE ENGINE STATUS ===
Evaluations: {} | Terminal transitions: {} | Trades: {}
Quotes: {} hits / {} misses ({:.1}% hit rate)
Fetch failures: {} | Swept entries: {}
Last update: {}
===============================
"#,
            self.evaluations.load(Ordering::Relaxed),
            self.terminal_transitions.load(Ordering::Relaxed),
            self.trades_recorded.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.hit_rate(),
            self.fetch_failures.load(Ordering::Relaxed),
            self.entries_swept.load(Ordering::Relaxed),
            self.last_update.load(Ordering::Relaxed),
        )
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        format!(
            r#"# HELP challenge_quote_cache_hits_total Quote lookups served from cache
# TYPE challenge_quote_cache_hits_total counter
challenge_quote_cache_hits_total {}

# HELP challenge_quote_cache_misses_total Quote lookups sent to the provider
# TYPE challenge_quote_cache_misses_total counter
challenge_quote_cache_misses_total {}

# HELP challenge_quote_fetch_failures_total Failed or timed-out provider calls
# TYPE challenge_quote_fetch_failures_total counter
challenge_quote_fetch_failures_total {}

# HELP challenge_quote_entries_swept_total Expired entries removed by the janitor
# TYPE challenge_quote_entries_swept_total counter
challenge_quote_entries_swept_total {}

# HELP challenge_evaluations_total Rule evaluations run
# TYPE challenge_evaluations_total counter
challenge_evaluations_total {}

# HELP challenge_terminal_transitions_total Challenges moved to PASSED or FAILED
# TYPE challenge_terminal_transitions_total counter
challenge_terminal_transitions_total {}

# HELP challenge_trades_recorded_total Trades recorded
# TYPE challenge_trades_recorded_total counter
challenge_trades_recorded_total {}
"#,
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
            self.entries_swept.load(Ordering::Relaxed),
            self.evaluations.load(Ordering::Relaxed),
            self.terminal_transitions.load(Ordering::Relaxed),
            self.trades_recorded.load(Ordering::Relaxed),
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        info!("{}", self.summary());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
