//! Latest-price storage shared between the tick consumer and decision logic

pub mod price_store;

pub use price_store::PriceStore;
