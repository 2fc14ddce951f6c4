//! Quote cache and service behaviour with a scripted provider

use async_trait::async_trait;
use challenge_engine::config::QuoteConfig;
use challenge_engine::domain::{QuoteBar, QuoteResponse, QuoteSnapshot};
use challenge_engine::error::{EngineError, Result};
use challenge_engine::market::{CacheJanitor, QuoteCache, QuoteFetcher, QuoteService};
use challenge_engine::services::Metrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn snapshot(symbol: &str, price: f64) -> QuoteSnapshot {
    let bar = QuoteBar {
        open: price,
        high: price,
        low: price,
        close: price,
        previous_close: price,
        volume: 100,
        time: None,
    };
    QuoteSnapshot::from_bar(symbol, bar, Utc::now()).unwrap()
}

/// Provider with a fixed price table; symbols not in it are unavailable
#[derive(Default)]
struct ScriptedFetcher {
    prices: Mutex<HashMap<String, f64>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    fn with(prices: &[(&str, f64)]) -> Self {
        let f = Self::default();
        for (s, p) in prices {
            f.prices.lock().unwrap().insert(s.to_string(), *p);
        }
        f
    }

    fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl QuoteFetcher for ScriptedFetcher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteSnapshot> {
        *self.calls.lock().unwrap().entry(symbol.to_string()).or_default() += 1;
        let price = self.prices.lock().unwrap().get(symbol).copied();
        match price {
            Some(p) => Ok(snapshot(symbol, p)),
            None => Err(EngineError::Unavailable(format!("no data for {symbol}"))),
        }
    }
}

fn config() -> QuoteConfig {
    QuoteConfig {
        ttl_secs: 10,
        sweep_interval_secs: 30,
        fetch_timeout_ms: 1000,
        base_url: "http://unused.test".into(),
        max_batch: 3,
        watchlist: Vec::new(),
    }
}

fn service(fetcher: Arc<ScriptedFetcher>) -> QuoteService {
    QuoteService::new(&config(), fetcher, Arc::new(Metrics::new()))
}

#[tokio::test]
async fn hit_within_ttl_and_refetch_after() {
    tokio::time::pause();
    let fetcher = Arc::new(ScriptedFetcher::with(&[("AAPL", 190.0)]));
    let quotes = service(fetcher.clone());

    let first = quotes.get_quote("aapl").await.unwrap();
    let second = quotes.get_quote("AAPL").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.calls("AAPL"), 1);

    fetcher.set_price("AAPL", 195.0);
    tokio::time::advance(Duration::from_secs(10)).await;

    let third = quotes.get_quote("AAPL").await.unwrap();
    assert_eq!(third.current_price, rust_decimal::Decimal::from(195));
    assert_eq!(fetcher.calls("AAPL"), 2);

    let m = quotes.metrics();
    assert_eq!(m.cache_hits.load(Ordering::SeqCst), 1);
    assert_eq!(m.cache_misses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn errors_are_never_cached() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let quotes = service(fetcher.clone());

    for _ in 0..3 {
        let err = quotes.get_quote("NOPE").await.unwrap_err();
        assert!(err.is_retryable());
    }
    assert_eq!(fetcher.calls("NOPE"), 3);
    assert!(quotes.cache().is_empty().await);

    // Provider recovers: the next call goes through
    fetcher.set_price("NOPE", 1.0);
    assert!(quotes.get_quote("NOPE").await.is_ok());
    assert_eq!(quotes.metrics().fetch_failures.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn batch_isolates_failures() {
    let fetcher = Arc::new(ScriptedFetcher::with(&[("AAPL", 190.0), ("MSFT", 410.0)]));
    let quotes = service(fetcher.clone());

    let symbols: Vec<String> = ["aapl", " MSFT ", "AAPL", "GONE"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let results = quotes.get_quotes(&symbols).await.unwrap();

    let names: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(names, ["AAPL", "MSFT", "GONE"]);
    assert!(results[0].1.snapshot().is_some());
    assert!(results[1].1.snapshot().is_some());
    assert!(matches!(results[2].1, QuoteResponse::Error(_)));
    assert_eq!(fetcher.calls("AAPL"), 1);

    let json = serde_json::to_value(&results[2].1).unwrap();
    assert!(json.get("current_price").is_none());
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn batch_limits_are_validated() {
    let quotes = service(Arc::new(ScriptedFetcher::default()));

    let empty = vec!["  ".to_string()];
    assert!(matches!(
        quotes.get_quotes(&empty).await,
        Err(EngineError::Validation(_))
    ));

    let too_many: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        quotes.get_quotes(&too_many).await,
        Err(EngineError::Validation(_))
    ));

    assert!(matches!(
        quotes.get_quote("").await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn service_lifecycle() {
    let quotes = service(Arc::new(ScriptedFetcher::default()));
    assert!(!quotes.is_running().await);
    quotes.start().await;
    assert!(quotes.is_running().await);
    quotes.stop().await;
    quotes.stop().await;
    assert!(!quotes.is_running().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_access_with_janitor_never_tears() {
    // Short TTL and sweep so entries expire and get swept while readers run
    let cache = Arc::new(QuoteCache::new(Duration::from_millis(5)));
    let metrics = Arc::new(Metrics::new());
    let janitor = CacheJanitor::new(cache.clone(), Duration::from_millis(2), metrics);
    janitor.start().await;

    let symbols = ["AAPL", "MSFT", "NVDA", "TSLA"];
    let mut tasks = Vec::new();
    for worker in 0..8usize {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..200usize {
                // Overlapping symbols for every worker plus one private symbol
                let shared = symbols[(worker + i) % symbols.len()];
                let private = format!("W{worker}");
                let price = (worker * 1000 + i) as f64;

                cache.set(shared, snapshot(shared, price)).await;
                cache.set(&private, snapshot(&private, price)).await;

                for sym in [shared, private.as_str()] {
                    if let Some(seen) = cache.get(sym).await {
                        // Whole snapshot from a single set: every field agrees
                        assert_eq!(seen.symbol, sym);
                        assert_eq!(seen.current_price, seen.high);
                        assert_eq!(seen.current_price, seen.low);
                        assert_eq!(seen.current_price, seen.previous_close);
                    }
                }
                if i % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    for t in tasks {
        t.await.unwrap();
    }
    janitor.stop().await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.purge_expired().await;
    assert!(cache.is_empty().await);
}

struct SlowFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl QuoteFetcher for SlowFetcher {
    fn name(&self) -> &str {
        "slow"
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(snapshot(symbol, 1.0))
    }
}

#[tokio::test]
async fn fetch_budget_turns_hangs_into_unavailable() {
    tokio::time::pause();
    let fetcher = Arc::new(SlowFetcher {
        calls: AtomicUsize::new(0),
    });
    let quotes = QuoteService::new(&config(), fetcher.clone(), Arc::new(Metrics::new()));

    let err = quotes.get_quote("SLOW").await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    assert!(quotes.cache().is_empty().await);

    quotes.get_quote("SLOW").await.unwrap_err();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn refresh_keeps_watchlist_warm() {
    tokio::time::pause();
    let fetcher = Arc::new(ScriptedFetcher::with(&[("AAPL", 190.0)]));
    let quotes = service(fetcher.clone());
    let watchlist = vec!["AAPL".to_string(), "GONE".to_string()];

    assert_eq!(quotes.refresh(&watchlist).await.unwrap(), 1);
    assert_eq!(quotes.cache().len().await, 1);

    // Readers hit the warmed entry without touching the provider
    quotes.get_quote("AAPL").await.unwrap();
    assert_eq!(fetcher.calls("AAPL"), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(quotes.refresh(&watchlist).await.unwrap(), 1);
    assert_eq!(fetcher.calls("AAPL"), 2);
    assert_eq!(fetcher.calls("GONE"), 2);
}
