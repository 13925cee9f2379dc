use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::validation::{rejection_reason, validate_order};
use crate::config::OrderRelayConfig;
use crate::error::RelayError;
use crate::models::{Confirmation, OrderRequest};
use crate::protocol::{FrameCodec, WireMessage};

/// Statistics for the order relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayStats {
    /// Connections accepted (lifetime)
    pub connections: u64,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
}

#[derive(Default)]
struct Counters {
    connections: AtomicU64,
    orders_accepted: AtomicU64,
    orders_rejected: AtomicU64,
}

/// Build the confirmation for one received order frame
///
/// Never fails: anything that is not a well-formed order becomes a
/// REJECTED confirmation naming the problem.
pub fn confirm(payload: &[u8]) -> Confirmation {
    match OrderRequest::from_payload(payload) {
        Ok(request) => match validate_order(&request) {
            Ok(order) => Confirmation::accepted(order),
            Err(errors) => Confirmation::rejected(rejection_reason(&errors)),
        },
        Err(e) => Confirmation::rejected(format!("malformed order: {}", e)),
    }
}

/// Order confirmation server
///
/// Each connection gets its own task. Frames on a connection are answered
/// strictly in order, one confirmation per order frame, and a rejected order
/// leaves the connection open for the next one.
pub struct OrderRelayServer {
    config: Arc<OrderRelayConfig>,
    counters: Arc<Counters>,
    started: Arc<Mutex<bool>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl OrderRelayServer {
    pub fn new(config: OrderRelayConfig) -> Self {
        Self {
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
            started: Arc::new(Mutex::new(false)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Bind and start accepting order connections
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        {
            let mut started = self.started.lock();
            if *started {
                return Err(RelayError::AlreadyStarted);
            }
            *started = true;
        }

        let addr = self.config.addr();
        let bound = match TcpListener::bind(&addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                *self.started.lock() = false;
                return Err(RelayError::Bind { addr, source });
            }
        };

        self.tasks.spawn(self.clone().accept_loop(listener));

        tracing::info!("🧾 Order relay listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting and close every open connection
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("🧾 Order relay stopped");
    }

    pub fn get_stats(&self) -> RelayStats {
        RelayStats {
            connections: self.counters.connections.load(Ordering::Relaxed),
            orders_accepted: self.counters.orders_accepted.load(Ordering::Relaxed),
            orders_rejected: self.counters.orders_rejected.load(Ordering::Relaxed),
        }
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    self.counters.connections.fetch_add(1, Ordering::Relaxed);
                    tracing::info!("🧾 Order client connected: {}", peer);
                    self.tasks.spawn(self.clone().serve_connection(stream, peer));
                }
                Err(e) => tracing::warn!("🧾 Accept failed: {}", e),
            }
        }
    }

    async fn serve_connection(self, stream: TcpStream, peer: SocketAddr) {
        let mut frames = Framed::new(stream, FrameCodec::new());

        let outcome = loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                next = frames.next() => next,
            };

            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            };

            let (confirmation, reply) =
                encode_confirmation(confirm(&payload), frames.codec().max_frame_length());
            match &confirmation {
                Confirmation::Accepted(order) => {
                    self.counters.orders_accepted.fetch_add(1, Ordering::Relaxed);
                    tracing::info!("🧾 Accepted from {}: {}", peer, order);
                }
                Confirmation::Rejected { reason } => {
                    self.counters.orders_rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("🧾 Rejected order from {}: {}", peer, reason);
                }
            }

            if let Err(e) = frames.send(reply).await {
                break Err(e);
            }
        };

        match outcome {
            Ok(()) => tracing::info!("🧾 Order client disconnected: {}", peer),
            Err(e) => tracing::warn!("🧾 Closing connection to {}: {}", peer, e),
        }
    }
}

/// Sent in place of a confirmation that cannot be framed
pub const UNENCODABLE_REASON: &str = "confirmation could not be encoded";

/// Encode the reply for one order frame
///
/// A confirmation that cannot be framed is swapped for a short rejection,
/// so the client still gets exactly one reply.
fn encode_confirmation(confirmation: Confirmation, max_frame_length: usize) -> (Confirmation, Bytes) {
    match confirmation.to_payload() {
        Ok(payload) if payload.len() <= max_frame_length => (confirmation, payload),
        Ok(payload) => {
            tracing::error!(
                "🧾 Confirmation of {} bytes exceeds the {} byte frame limit",
                payload.len(),
                max_frame_length
            );
            unencodable()
        }
        Err(e) => {
            tracing::error!("🧾 Cannot encode {:?}: {}", confirmation, e);
            unencodable()
        }
    }
}

fn unencodable() -> (Confirmation, Bytes) {
    let payload = Bytes::from(format!(
        r#"{{"status":"REJECTED","reason":"{}"}}"#,
        UNENCODABLE_REASON
    ));
    (Confirmation::rejected(UNENCODABLE_REASON), payload)
}

impl Clone for OrderRelayServer {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            counters: Arc::clone(&self.counters),
            started: Arc::clone(&self.started),
            shutdown: self.shutdown.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Order, OrderSide};
    use serde_json::json;

    #[test]
    fn test_confirm_accepts_valid_order() {
        let confirmation = confirm(br#"{"symbol":"AAPL","side":"BUY","qty":10,"price":150.0}"#);
        assert_eq!(
            confirmation,
            Confirmation::accepted(Order::new("AAPL", OrderSide::Buy, 10, 150.0))
        );
    }

    #[test]
    fn test_confirm_rejects_missing_qty() {
        let confirmation = confirm(br#"{"symbol":"AAPL","side":"BUY","price":150.0}"#);
        assert_eq!(
            serde_json::to_value(&confirmation).unwrap(),
            json!({"status": "REJECTED", "reason": "missing qty"})
        );
    }

    #[test]
    fn test_confirm_rejects_non_json() {
        match confirm(b"BUY AAPL 10") {
            Confirmation::Rejected { reason } => assert!(reason.starts_with("malformed order")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!confirm(b"[1,2,3]").is_accepted());
    }

    #[test]
    fn test_oversized_confirmation_becomes_short_rejection() {
        let accepted = Confirmation::accepted(Order::new("A".repeat(200), OrderSide::Buy, 1, 1.0));
        let (confirmation, payload) = encode_confirmation(accepted, 64);

        assert_eq!(confirmation, Confirmation::rejected(UNENCODABLE_REASON));
        assert_eq!(Confirmation::from_payload(&payload).unwrap(), confirmation);
    }

    #[tokio::test]
    async fn test_bind_failure_and_double_start() {
        let server = OrderRelayServer::new(OrderRelayConfig {
            port: 0,
            ..OrderRelayConfig::default()
        });
        let addr = server.start().await.unwrap();
        assert!(matches!(server.start().await, Err(RelayError::AlreadyStarted)));

        let clash = OrderRelayServer::new(OrderRelayConfig {
            port: addr.port(),
            ..OrderRelayConfig::default()
        });
        assert!(matches!(clash.start().await, Err(RelayError::Bind { .. })));

        server.stop().await;
    }
}
