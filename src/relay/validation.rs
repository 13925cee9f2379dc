//! Order request validation
//!
//! Every field is checked independently so a rejection can name all of the
//! problems with a request at once, not just the first one found.

use serde_json::Value;
use thiserror::Error;

use crate::models::{Order, OrderRequest, OrderSide};

/// A single problem with one field of an order request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderFieldError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid symbol: must be a non-empty string")]
    InvalidSymbol,

    #[error("invalid side: expected BUY or SELL, got {0}")]
    InvalidSide(String),

    #[error("invalid qty: expected a positive integer, got {0}")]
    InvalidQty(String),

    #[error("invalid price: expected a non-negative number, got {0}")]
    InvalidPrice(String),
}

impl OrderFieldError {
    pub fn is_missing(&self) -> bool {
        matches!(self, OrderFieldError::Missing(_))
    }
}

/// Join field errors into the `reason` text of a REJECTED confirmation
pub fn rejection_reason(errors: &[OrderFieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Individual Validation Functions
// ============================================================================

/// `symbol` must be a non-empty string
pub fn validate_symbol(value: Option<&Value>) -> Result<String, OrderFieldError> {
    match value {
        None | Some(Value::Null) => Err(OrderFieldError::Missing("symbol")),
        Some(Value::String(symbol)) if !symbol.trim().is_empty() => Ok(symbol.clone()),
        Some(_) => Err(OrderFieldError::InvalidSymbol),
    }
}

/// `side` must be exactly BUY or SELL
pub fn validate_side(value: Option<&Value>) -> Result<OrderSide, OrderFieldError> {
    match value {
        None | Some(Value::Null) => Err(OrderFieldError::Missing("side")),
        Some(Value::String(side)) => {
            OrderSide::parse(side).ok_or_else(|| OrderFieldError::InvalidSide(side.clone()))
        }
        Some(other) => Err(OrderFieldError::InvalidSide(other.to_string())),
    }
}

/// `qty` must be a strictly positive JSON integer
pub fn validate_qty(value: Option<&Value>) -> Result<u64, OrderFieldError> {
    match value {
        None | Some(Value::Null) => Err(OrderFieldError::Missing("qty")),
        Some(raw) => match raw.as_u64() {
            Some(qty) if qty > 0 => Ok(qty),
            _ => Err(OrderFieldError::InvalidQty(raw.to_string())),
        },
    }
}

/// `price` must be a finite, non-negative JSON number
pub fn validate_price(value: Option<&Value>) -> Result<f64, OrderFieldError> {
    match value {
        None | Some(Value::Null) => Err(OrderFieldError::Missing("price")),
        Some(raw) => match raw.as_f64() {
            Some(price) if price.is_finite() && price >= 0.0 => Ok(price),
            _ => Err(OrderFieldError::InvalidPrice(raw.to_string())),
        },
    }
}

// ============================================================================
// Composite Validation Function
// ============================================================================

/// Validate a raw request and build the [`Order`] it describes
///
/// Returns every field error found, in `symbol, side, qty, price` order.
pub fn validate_order(request: &OrderRequest) -> Result<Order, Vec<OrderFieldError>> {
    let symbol = validate_symbol(request.get("symbol"));
    let side = validate_side(request.get("side"));
    let qty = validate_qty(request.get("qty"));
    let price = validate_price(request.get("price"));

    match (symbol, side, qty, price) {
        (Ok(symbol), Ok(side), Ok(qty), Ok(price)) => Ok(Order::new(symbol, side, qty, price)),
        (symbol, side, qty, price) => {
            let errors = [symbol.err(), side.err(), qty.err(), price.err()]
                .into_iter()
                .flatten()
                .collect();
            Err(errors)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
