//! Order relay: request/confirm exchange between a strategy and the
//! order confirmation service

pub mod client;
pub mod server;
pub mod validation;

pub use client::OrderClient;
pub use server::{confirm, OrderRelayServer, RelayStats};
pub use validation::{validate_order, OrderFieldError};
