use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::QuoteCache;
use crate::services::Metrics;

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background sweep over expired cache entries.
///
/// Lazy expiry in `QuoteCache::get` only reclaims symbols that are asked for
/// again; this removes the rest.
pub struct CacheJanitor {
    cache: Arc<QuoteCache>,
    interval: Duration,
    metrics: Arc<Metrics>,
    running: Mutex<Option<Running>>,
}

impl CacheJanitor {
    pub fn new(cache: Arc<QuoteCache>, interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            cache,
            interval,
            metrics,
            running: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn the sweep task; no-op if already running
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(&self.cache);
        let metrics = Arc::clone(&self.metrics);
        let interval = self.interval;

        info!("Quote cache janitor started (interval: {:?})", interval);

        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let removed = cache.purge_expired().await;
                        if removed > 0 {
                            metrics.add_entries_swept(removed);
                        }
                        debug!(removed, "Quote cache sweep");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Quote cache janitor stopped");
        });

        *running = Some(Running { shutdown, handle });
    }

    /// Signal the sweep task and wait for it to exit; no-op if not running
    pub async fn stop(&self) {
        let Some(Running { shutdown, handle }) = self.running.lock().await.take() else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            warn!("Quote cache janitor ended abnormally: {}", e);
        }
    }
}
