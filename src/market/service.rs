use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::{normalize_symbol, Lookup};
use super::{CacheJanitor, QuoteCache, QuoteFetcher};
use crate::config::QuoteConfig;
use crate::domain::{QuoteResponse, QuoteSnapshot};
use crate::error::{EngineError, Result};
use crate::services::Metrics;

/// Read-through quote access for request handlers.
///
/// Owns the cache, the provider and the janitor; construct once and share.
pub struct QuoteService {
    cache: Arc<QuoteCache>,
    fetcher: Arc<dyn QuoteFetcher>,
    janitor: CacheJanitor,
    metrics: Arc<Metrics>,
    fetch_timeout: Duration,
    max_batch: usize,
}

impl QuoteService {
    pub fn new(config: &QuoteConfig, fetcher: Arc<dyn QuoteFetcher>, metrics: Arc<Metrics>) -> Self {
        let cache = Arc::new(QuoteCache::new(config.ttl()));
        let janitor = CacheJanitor::new(cache.clone(), config.sweep_interval(), metrics.clone());

        Self {
            cache,
            fetcher,
            janitor,
            metrics,
            fetch_timeout: config.fetch_timeout(),
            max_batch: config.max_batch,
        }
    }

    pub fn cache(&self) -> Arc<QuoteCache> {
        Arc::clone(&self.cache)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Start the background sweep
    pub async fn start(&self) {
        self.janitor.start().await;
    }

    /// Stop the background sweep and wait for it
    pub async fn stop(&self) {
        self.janitor.stop().await;
    }

    pub async fn is_running(&self) -> bool {
        self.janitor.is_running().await
    }

    pub async fn get_quote(&self, symbol: &str) -> Result<QuoteSnapshot> {
        match self
            .cache
            .get_or_fetch(symbol, self.fetcher.as_ref(), self.fetch_timeout)
            .await
        {
            Ok((snapshot, Lookup::Hit)) => {
                self.metrics.inc_cache_hits();
                Ok(snapshot)
            }
            Ok((snapshot, Lookup::Miss)) => {
                self.metrics.inc_cache_misses();
                Ok(snapshot)
            }
            Err(e @ EngineError::Validation(_)) => Err(e),
            Err(e) => {
                self.metrics.inc_cache_misses();
                self.metrics.inc_fetch_failures();
                Err(e)
            }
        }
    }

    /// Look up several symbols at once. One failing symbol yields an error
    /// entry in its slot and does not fail the batch.
    pub async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<(String, QuoteResponse)>> {
        let mut unique: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols.iter().map(|s| normalize_symbol(s)) {
            if !symbol.is_empty() && !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }

        if unique.is_empty() {
            return Err(EngineError::Validation("no symbols provided".into()));
        }
        if unique.len() > self.max_batch {
            return Err(EngineError::Validation(format!(
                "at most {} symbols per request, got {}",
                self.max_batch,
                unique.len()
            )));
        }

        debug!(count = unique.len(), "Batch quote lookup");
        let results = join_all(unique.iter().map(|s| self.get_quote(s))).await;

        Ok(unique
            .into_iter()
            .zip(results)
            .map(|(symbol, result)| (symbol, QuoteResponse::from(result)))
            .collect())
    }

    /// Re-read `symbols` through the cache so readers find them warm.
    /// Returns how many symbols could not be fetched.
    pub async fn refresh(&self, symbols: &[String]) -> Result<usize> {
        let results = self.get_quotes(symbols).await?;
        for (symbol, response) in &results {
            if let QuoteResponse::Error(e) = response {
                warn!(%symbol, error = %e.error, "Watchlist refresh failed");
            }
        }
        Ok(results.iter().filter(|(_, r)| r.is_error()).count())
    }
}
