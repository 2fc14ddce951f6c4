use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::QuoteFetcher;
use crate::domain::QuoteSnapshot;
use crate::error::{EngineError, Result};

pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Cache key for a symbol
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: QuoteSnapshot,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Where a read-through lookup was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// TTL cache of quote snapshots.
///
/// One lock guards the whole key space and is only held for map operations;
/// provider calls happen outside it.
pub struct QuoteCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live snapshot for `symbol`; an expired entry is removed and reported as a miss
    pub async fn get(&self, symbol: &str) -> Option<QuoteSnapshot> {
        let key = normalize_symbol(symbol);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(&key) {
            Some(entry) if entry.is_live(now) => return Some(entry.snapshot.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(&key);
            debug!(symbol = %key, "Quote expired");
        }
        None
    }

    /// Store `snapshot` until now + ttl, replacing any previous entry
    pub async fn set(&self, symbol: &str, snapshot: QuoteSnapshot) {
        let key = normalize_symbol(symbol);
        let entry = CacheEntry {
            snapshot,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().await.insert(key, entry);
    }

    /// Drop every entry past its expiry; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Entries currently held, live or not yet swept
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Read-through lookup. On a miss, `fetcher` is called without the lock
    /// held and bounded by `budget`; only a successful fetch is stored.
    pub async fn get_or_fetch(
        &self,
        symbol: &str,
        fetcher: &dyn QuoteFetcher,
        budget: Duration,
    ) -> Result<(QuoteSnapshot, Lookup)> {
        let key = normalize_symbol(symbol);
        if key.is_empty() {
            return Err(EngineError::Validation("symbol must not be blank".into()));
        }

        if let Some(snapshot) = self.get(&key).await {
            debug!(symbol = %key, "Quote cache hit");
            return Ok((snapshot, Lookup::Hit));
        }

        debug!(symbol = %key, provider = fetcher.name(), "Quote cache miss");
        let fetched = match tokio::time::timeout(budget, fetcher.fetch(&key)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Unavailable(format!(
                "{} did not answer for {} within {:?}",
                fetcher.name(),
                key,
                budget
            ))),
        };

        match fetched {
            Ok(snapshot) => {
                self.set(&key, snapshot.clone()).await;
                Ok((snapshot, Lookup::Miss))
            }
            Err(e) => {
                warn!(symbol = %key, error = %e, "Quote fetch failed");
                Err(e)
            }
        }
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
