use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::FRAME_DELIMITER;
use crate::error::FrameError;
use crate::models::{Confirmation, Order, OrderRequest, Tick, TickKind, MAX_SENTIMENT};

/// Decimal places used for prices on the tick stream
pub const PRICE_DECIMALS: usize = 4;

/// A record that fits in the payload of a single frame
///
/// Payloads never include the delimiter; [`super::FrameCodec`] adds and
/// strips it.
pub trait WireMessage: Sized {
    fn from_payload(payload: &[u8]) -> Result<Self, FrameError>;
    fn to_payload(&self) -> Result<Bytes, FrameError>;
}

fn payload_text(payload: &[u8]) -> Result<&str, FrameError> {
    Ok(std::str::from_utf8(payload)?.trim())
}

fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    Ok(serde_json::from_str(payload_text(payload)?)?)
}

/// Serialize to JSON that never contains the frame delimiter
///
/// `*` can only appear inside a JSON string, where the `\u002a` escape
/// decodes to the same character.
fn encode_json<T: Serialize>(value: &T) -> Result<Bytes, FrameError> {
    let json = serde_json::to_vec(value)?;
    if !json.contains(&FRAME_DELIMITER) {
        return Ok(Bytes::from(json));
    }

    let mut escaped = Vec::with_capacity(json.len() + 8);
    for byte in json {
        if byte == FRAME_DELIMITER {
            escaped.extend_from_slice(br"\u002a");
        } else {
            escaped.push(byte);
        }
    }
    Ok(Bytes::from(escaped))
}

// ============================================================================
// Tick stream: PRICE,<INSTRUMENT>,<PRICE> | NEWS,<SENTIMENT>
// ============================================================================

impl WireMessage for Tick {
    fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        let text = payload_text(payload)?;
        let mut fields = text.split(',').map(str::trim);

        let tick = match fields.next() {
            Some(kind) if kind == TickKind::Price.as_str() => {
                let instrument = fields
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| FrameError::Malformed(format!("PRICE without instrument: {text:?}")))?;
                let raw_price = fields
                    .next()
                    .ok_or_else(|| FrameError::Malformed(format!("PRICE without value: {text:?}")))?;
                let price = raw_price
                    .parse::<f64>()
                    .ok()
                    .filter(|p| p.is_finite() && *p >= 0.0)
                    .ok_or_else(|| FrameError::Malformed(format!("invalid price {raw_price:?}")))?;

                Tick::price(instrument, price)
            }
            Some(kind) if kind == TickKind::News.as_str() => {
                let raw_sentiment = fields
                    .next()
                    .ok_or_else(|| FrameError::Malformed(format!("NEWS without sentiment: {text:?}")))?;
                let sentiment = raw_sentiment
                    .parse::<u8>()
                    .ok()
                    .filter(|s| *s <= MAX_SENTIMENT)
                    .ok_or_else(|| FrameError::Malformed(format!("invalid sentiment {raw_sentiment:?}")))?;

                Tick::news(sentiment)
            }
            _ => return Err(FrameError::Malformed(format!("unknown tick frame: {text:?}"))),
        };

        if fields.next().is_some() {
            return Err(FrameError::Malformed(format!("unexpected trailing fields: {text:?}")));
        }

        Ok(tick)
    }

    fn to_payload(&self) -> Result<Bytes, FrameError> {
        let text = match self {
            Tick::Price { instrument, price } => {
                if instrument.is_empty()
                    || instrument.contains(',')
                    || instrument.as_bytes().contains(&FRAME_DELIMITER)
                {
                    return Err(FrameError::Malformed(format!(
                        "instrument {instrument:?} cannot be framed"
                    )));
                }
                format!("PRICE,{},{:.*}", instrument, PRICE_DECIMALS, price)
            }
            Tick::News { sentiment } => format!("NEWS,{}", sentiment),
        };

        Ok(Bytes::from(text))
    }
}

// ============================================================================
// Order relay: one JSON object per frame
// ============================================================================

impl WireMessage for OrderRequest {
    fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        match decode_json::<Value>(payload)? {
            Value::Object(fields) => Ok(OrderRequest::from_fields(fields)),
            other => Err(FrameError::Malformed(format!(
                "order must be a JSON object, got {other}"
            ))),
        }
    }

    fn to_payload(&self) -> Result<Bytes, FrameError> {
        encode_json(self)
    }
}

impl WireMessage for Order {
    fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        decode_json(payload)
    }

    fn to_payload(&self) -> Result<Bytes, FrameError> {
        encode_json(self)
    }
}

impl WireMessage for Confirmation {
    fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        decode_json(payload)
    }

    fn to_payload(&self) -> Result<Bytes, FrameError> {
        encode_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;

    #[test]
    fn test_price_tick_uses_four_decimals() {
        let payload = Tick::price("AAPL", 101.23456).to_payload().unwrap();
        assert_eq!(&payload[..], b"PRICE,AAPL,101.2346");
    }

    #[test]
    fn test_parse_price_and_news() {
        assert_eq!(
            Tick::from_payload(b"PRICE,MSFT,99.5000").unwrap(),
            Tick::price("MSFT", 99.5)
        );
        assert_eq!(Tick::from_payload(b" NEWS,73 ").unwrap(), Tick::news(73));
    }

    #[test]
    fn test_malformed_ticks_are_recoverable_errors() {
        for bad in [
            &b"PRICE,AAPL"[..],
            b"PRICE,,100.0",
            b"PRICE,AAPL,abc",
            b"PRICE,AAPL,-1.0",
            b"NEWS,101",
            b"NEWS",
            b"TRADE,AAPL,1",
            b"NEWS,5,extra",
            b"\xff\xfe",
        ] {
            let err = Tick::from_payload(bad).unwrap_err();
            assert!(err.is_recoverable(), "{:?} -> {}", bad, err);
        }
    }

    #[test]
    fn test_instrument_with_separator_cannot_be_framed() {
        assert!(Tick::price("A,B", 1.0).to_payload().is_err());
        assert!(Tick::price("A*B", 1.0).to_payload().is_err());
    }

    #[test]
    fn test_json_payloads_escape_the_delimiter() {
        let confirmation = Confirmation::rejected(r#"invalid symbol "A*B""#);
        let payload = confirmation.to_payload().unwrap();
        assert!(!payload.contains(&FRAME_DELIMITER));
        assert_eq!(Confirmation::from_payload(&payload).unwrap(), confirmation);

        let request = OrderRequest::new().with("symbol", "**");
        let payload = request.to_payload().unwrap();
        assert_eq!(&payload[..], br#"{"symbol":"\u002a\u002a"}"#);
        assert_eq!(OrderRequest::from_payload(&payload).unwrap(), request);
    }

    #[test]
    fn test_order_request_must_be_object() {
        assert!(OrderRequest::from_payload(br#"{"symbol":"AAPL"}"#).is_ok());
        assert!(matches!(
            OrderRequest::from_payload(b"[1,2,3]"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            OrderRequest::from_payload(b"not json"),
            Err(FrameError::Json(_))
        ));
    }

    #[test]
    fn test_confirmation_from_wire() {
        let confirmation = Confirmation::from_payload(
            br#"{"status":"ACCEPTED","symbol":"AAPL","side":"BUY","qty":10,"price":150.0}"#,
        )
        .unwrap();
        assert_eq!(
            confirmation,
            Confirmation::accepted(Order::new("AAPL", OrderSide::Buy, 10, 150.0))
        );
    }
}
