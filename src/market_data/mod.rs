/// Market data distribution module
///
/// The TickBroadcaster generates a synthetic price walk and fans framed
/// ticks out to every connected subscriber. The TickConsumer is the other
/// end of that wire: it keeps a PriceStore current and forwards events to
/// whoever is trading on them.

pub mod broadcaster;
pub mod consumer;
pub mod price_walk;

pub use broadcaster::{BroadcasterState, BroadcasterStats, TickBroadcaster};
pub use consumer::{SessionEnd, SessionSummary, TickConsumer};
pub use price_walk::PriceWalk;
