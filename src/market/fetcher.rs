use async_trait::async_trait;

use crate::domain::QuoteSnapshot;
use crate::error::Result;

/// Source of fresh quotes, called by the cache on a miss
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Fetch a snapshot for an upper-cased symbol.
    ///
    /// Fails with `Unavailable` when the provider has no data or errors.
    /// May block on network I/O.
    async fn fetch(&self, symbol: &str) -> Result<QuoteSnapshot>;
}
