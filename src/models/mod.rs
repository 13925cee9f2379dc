pub mod order;
pub mod tick;

pub use order::{Confirmation, Order, OrderRequest, OrderSide};
pub use tick::{MarketEvent, Tick, TickKind, MAX_SENTIMENT};
