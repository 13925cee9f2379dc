//! Trading decisions on top of the consumed tick stream

pub mod decision;
pub mod trader;

pub use decision::{round_to_cents, Decision, DecisionEngine};
pub use trader::{Trader, TraderSummary};
