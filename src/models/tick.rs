use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest sentiment score a NEWS tick can carry
pub const MAX_SENTIMENT: u8 = 100;

/// A single event produced by the tick broadcaster
///
/// Ticks are immutable once built; the broadcaster frames them and the
/// consumer parses them back on the other end of the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Latest synthetic price for an instrument
    Price { instrument: String, price: f64 },
    /// Market-wide news sentiment score (0-100)
    News { sentiment: u8 },
}

/// Discriminant of a [`Tick`], as it appears at the start of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TickKind {
    Price,
    News,
}

impl TickKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickKind::Price => "PRICE",
            TickKind::News => "NEWS",
        }
    }
}

impl fmt::Display for TickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tick {
    pub fn price(instrument: impl Into<String>, price: f64) -> Self {
        Tick::Price {
            instrument: instrument.into(),
            price,
        }
    }

    /// Build a NEWS tick, capping the score at [`MAX_SENTIMENT`]
    pub fn news(sentiment: u8) -> Self {
        Tick::News {
            sentiment: sentiment.min(MAX_SENTIMENT),
        }
    }

    pub fn kind(&self) -> TickKind {
        match self {
            Tick::Price { .. } => TickKind::Price,
            Tick::News { .. } => TickKind::News,
        }
    }

    /// Instrument this tick prices, `None` for NEWS
    pub fn instrument(&self) -> Option<&str> {
        match self {
            Tick::Price { instrument, .. } => Some(instrument),
            Tick::News { .. } => None,
        }
    }
}

/// What the tick consumer hands to downstream observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketEvent {
    Price {
        instrument: String,
        price: f64,
        received_at: DateTime<Utc>,
    },
    News {
        sentiment: u8,
        received_at: DateTime<Utc>,
    },
}

impl MarketEvent {
    /// Stamp a decoded tick with the time it was received
    pub fn from_tick(tick: Tick) -> Self {
        let received_at = Utc::now();
        match tick {
            Tick::Price { instrument, price } => MarketEvent::Price {
                instrument,
                price,
                received_at,
            },
            Tick::News { sentiment } => MarketEvent::News {
                sentiment,
                received_at,
            },
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::Price { received_at, .. } | MarketEvent::News { received_at, .. } => {
                *received_at
            }
        }
    }
}
