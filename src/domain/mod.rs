pub mod challenge;
pub mod quote;
pub mod state;
pub mod trade;

pub use challenge::*;
pub use quote::*;
pub use state::*;
pub use trade::*;

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a money or percentage value to 2dp for display
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
