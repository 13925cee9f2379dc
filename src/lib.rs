// Library Crate Root
// lib.rs

// Every binary in src/bin and src/main.rs imports through here like an external crate
pub mod config;
pub mod error;
pub mod market_data;
pub mod models;
pub mod net;
pub mod protocol;
pub mod relay;
pub mod store;
pub mod strategy;
pub mod telemetry;

// pub use = re-export at crate root
pub use config::AppConfig;
pub use error::{ConfigError, ConnectError, ConsumerError, FrameError, GatewayError, RelayError, StoreError};
pub use market_data::{TickBroadcaster, TickConsumer};
pub use models::{Confirmation, MarketEvent, Order, OrderSide, Tick};
pub use relay::{OrderClient, OrderRelayServer};
pub use store::PriceStore;
pub use strategy::{DecisionEngine, Trader};
