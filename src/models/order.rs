use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Parse an exact wire side name (`BUY` or `SELL`)
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated order as it travels from the decision engine to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: u64,
    pub price: f64,
}

impl Order {
    pub fn new(symbol: impl Into<String>, side: OrderSide, qty: u64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            qty,
            price,
        }
    }

    /// Signed position change this order represents
    pub fn signed_qty(&self) -> i64 {
        let qty = i64::try_from(self.qty).unwrap_or(i64::MAX);
        match self.side {
            OrderSide::Buy => qty,
            OrderSide::Sell => -qty,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} @ {}", self.side, self.qty, self.symbol, self.price)
    }
}

/// An order request exactly as received from the wire
///
/// Fields are kept as loose JSON values so that validation can name every
/// missing or malformed field instead of failing on the first serde error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRequest {
    fields: Map<String, Value>,
}

impl OrderRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builder-style setter, mostly useful in tests and tools
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl From<&Order> for OrderRequest {
    fn from(order: &Order) -> Self {
        OrderRequest::new()
            .with("symbol", order.symbol.as_str())
            .with("side", order.side.as_str())
            .with("qty", order.qty)
            .with("price", order.price)
    }
}

/// The relay's answer to a single order frame
///
/// Serialized as `{"status":"ACCEPTED",...order fields}` or
/// `{"status":"REJECTED","reason":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum Confirmation {
    Accepted(Order),
    Rejected { reason: String },
}

impl Confirmation {
    pub fn accepted(order: Order) -> Self {
        Confirmation::Accepted(order)
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Confirmation::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Confirmation::Accepted(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            Confirmation::Accepted(_) => "ACCEPTED",
            Confirmation::Rejected { .. } => "REJECTED",
        }
    }
}
