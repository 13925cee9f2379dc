use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::config::OrderRelayConfig;
use crate::error::RelayError;
use crate::models::{Confirmation, Order, OrderRequest};
use crate::net::connect_with_retry;
use crate::protocol::{FrameCodec, WireMessage};

/// Client side of the order relay
///
/// Holds one connection and runs one request at a time: each submit sends
/// a single order frame and waits for exactly one confirmation, bounded by
/// the read timeout.
pub struct OrderClient {
    frames: Framed<TcpStream, FrameCodec>,
    peer: String,
    read_timeout: Duration,
}

impl OrderClient {
    /// Connect to the relay, retrying per `relay.reconnect` until `shutdown`
    pub async fn connect(
        relay: &OrderRelayConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, RelayError> {
        let stream = connect_with_retry(&relay.addr(), &relay.reconnect, shutdown, None).await?;
        Ok(Self::from_stream(stream, relay.read_timeout()))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, read_timeout: Duration) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            frames: Framed::new(stream, FrameCodec::new()),
            peer,
            read_timeout,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn submit(&mut self, order: &Order) -> Result<Confirmation, RelayError> {
        self.submit_request(&OrderRequest::from(order)).await
    }

    /// Send a raw request and wait for its confirmation
    pub async fn submit_request(
        &mut self,
        request: &OrderRequest,
    ) -> Result<Confirmation, RelayError> {
        let payload = request.to_payload()?;
        self.frames.send(payload).await?;

        let deadline = Instant::now() + self.read_timeout;
        loop {
            let payload = match timeout_at(deadline, self.frames.next()).await {
                Err(_) => return Err(RelayError::ConfirmationTimeout(self.read_timeout)),
                Ok(None) => return Err(RelayError::PeerClosed),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(payload))) => payload,
            };

            match Confirmation::from_payload(&payload) {
                Ok(confirmation) => return Ok(confirmation),
                Err(e) => tracing::warn!(
                    "🧾 Ignoring undecodable frame from {}: {} ({:?})",
                    self.peer,
                    e,
                    String::from_utf8_lossy(&payload)
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use crate::relay::OrderRelayServer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn start_server() -> (OrderRelayServer, OrderClient) {
        let server = OrderRelayServer::new(OrderRelayConfig {
            port: 0,
            ..OrderRelayConfig::default()
        });
        let addr = server.start().await.unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        (server, OrderClient::from_stream(stream, Duration::from_secs(2)))
    }

    #[tokio::test]
    async fn test_accepted_order_is_echoed() {
        let (server, mut client) = start_server().await;
        let order = Order::new("AAPL", OrderSide::Buy, 10, 150.0);

        let confirmation = client.submit(&order).await.unwrap();
        assert_eq!(confirmation, Confirmation::accepted(order));
        assert_eq!(server.get_stats().orders_accepted, 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_rejection_keeps_connection_usable() {
        let (server, mut client) = start_server().await;

        let missing_qty = OrderRequest::new()
            .with("symbol", "AAPL")
            .with("side", "BUY")
            .with("price", 150.0);
        let confirmation = client.submit_request(&missing_qty).await.unwrap();
        assert_eq!(confirmation, Confirmation::rejected("missing qty"));

        let order = Order::new("MSFT", OrderSide::Sell, 5, 310.25);
        let confirmation = client.submit(&order).await.unwrap();
        assert_eq!(confirmation, Confirmation::accepted(order));

        let stats = server.get_stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.orders_rejected, 1);
        assert_eq!(stats.orders_accepted, 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_symbol_with_delimiter_is_confirmed_and_connection_survives() {
        let (server, mut client) = start_server().await;

        let starred = Order::new("A*B", OrderSide::Buy, 1, 10.0);
        let confirmation = client.submit(&starred).await.unwrap();
        assert_eq!(confirmation, Confirmation::accepted(starred));

        let order = Order::new("MSFT", OrderSide::Sell, 5, 310.25);
        let confirmation = client.submit(&order).await.unwrap();
        assert_eq!(confirmation, Confirmation::accepted(order));

        let stats = server.get_stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.orders_accepted, 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_escaped_delimiter_from_raw_client_gets_reply() {
        let server = OrderRelayServer::new(OrderRelayConfig {
            port: 0,
            ..OrderRelayConfig::default()
        });
        let addr = server.start().await.unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(
                br#"{"symbol":"A\u002aB","side":"BUY","qty":1,"price":1.0}*{"symbol":"C","side":"SELL","qty":2,"price":2.0}*"#,
            )
            .await
            .unwrap();

        let mut frames = Framed::new(stream, FrameCodec::new());
        for expected in [
            Order::new("A*B", OrderSide::Buy, 1, 1.0),
            Order::new("C", OrderSide::Sell, 2, 2.0),
        ] {
            let payload = tokio::time::timeout(Duration::from_secs(2), frames.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(
                Confirmation::from_payload(&payload).unwrap(),
                Confirmation::accepted(expected)
            );
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_confirmations_follow_receipt_order() {
        let server = OrderRelayServer::new(OrderRelayConfig {
            port: 0,
            ..OrderRelayConfig::default()
        });
        let addr = server.start().await.unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Two orders and a garbage frame in a single write
        stream
            .write_all(
                br#"{"symbol":"A","side":"BUY","qty":1,"price":1.0}*oops*{"symbol":"B","side":"SELL","qty":2,"price":2.0}*"#,
            )
            .await
            .unwrap();

        let mut frames = Framed::new(stream, FrameCodec::new());
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let payload = tokio::time::timeout(Duration::from_secs(2), frames.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            statuses.push(Confirmation::from_payload(&payload).unwrap());
        }

        assert_eq!(statuses[0], Confirmation::accepted(Order::new("A", OrderSide::Buy, 1, 1.0)));
        assert!(!statuses[1].is_accepted());
        assert_eq!(statuses[2], Confirmation::accepted(Order::new("B", OrderSide::Sell, 2, 2.0)));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut sink = [0u8; 1024];
            // Read and never answer
            while socket.read(&mut sink).await.unwrap_or(0) > 0 {}
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = OrderClient::from_stream(stream, Duration::from_millis(100));
        let err = client
            .submit(&Order::new("AAPL", OrderSide::Buy, 10, 99.0))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ConfirmationTimeout(_)));
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Drop without replying
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = OrderClient::from_stream(stream, Duration::from_secs(2));
        let err = client
            .submit(&Order::new("AAPL", OrderSide::Buy, 10, 99.0))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::PeerClosed | RelayError::Frame(_)));
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    async fn test_garbage_before_confirmation_is_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(br#"hello*{"status":"REJECTED","reason":"closed"}*"#)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = OrderClient::from_stream(stream, Duration::from_secs(2));
        let confirmation = client
            .submit(&Order::new("AAPL", OrderSide::Buy, 10, 99.0))
            .await
            .unwrap();
        assert_eq!(confirmation, Confirmation::rejected("closed"));
    }
}
