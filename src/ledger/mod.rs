//! Persistence boundary for challenges and trades

mod memory;
mod traits;

pub use memory::InMemoryStore;
pub use traits::{ChallengeStore, TradeLedger};

#[cfg(test)]
pub use traits::{MockChallengeStore, MockTradeLedger};
