pub mod postgres;
pub mod yahoo;

pub use postgres::PostgresStore;
pub use yahoo::YahooQuoteFetcher;
