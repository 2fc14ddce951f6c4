//! Cached market quotes

mod cache;
mod fetcher;
mod janitor;
mod service;

pub use cache::{normalize_symbol, Lookup, QuoteCache, DEFAULT_TTL};
pub use fetcher::QuoteFetcher;
pub use janitor::CacheJanitor;
pub use service::QuoteService;
