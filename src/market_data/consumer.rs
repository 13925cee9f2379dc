use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::config::ConsumerConfig;
use crate::error::{ConsumerError, StoreError};
use crate::models::{MarketEvent, Tick};
use crate::net::connect_with_retry;
use crate::protocol::{FrameCodec, WireMessage};
use crate::store::PriceStore;

/// How a consumer session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The broadcaster closed the stream
    PeerClosed,
    /// The transport failed mid-session (reset, oversized frame)
    Disconnected,
    /// Local shutdown was requested
    Stopped,
}

/// Per-session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub prices: u64,
    pub news: u64,
    pub skipped: u64,
}

/// Tick stream client
///
/// Connects to a [`TickBroadcaster`](super::TickBroadcaster), decodes its
/// frame stream, writes every PRICE into the shared [`PriceStore`] and hands
/// both PRICE and NEWS on to an optional observer channel. Frames that do not
/// parse are logged and skipped.
pub struct TickConsumer {
    config: ConsumerConfig,
    store: Arc<PriceStore>,
    events: Option<mpsc::UnboundedSender<MarketEvent>>,
    connect_attempts: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl TickConsumer {
    /// Consumer that only maintains the price store
    pub fn new(config: ConsumerConfig, store: Arc<PriceStore>) -> Self {
        Self {
            config,
            store,
            events: None,
            connect_attempts: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Consumer that also forwards every decoded tick as a [`MarketEvent`]
    pub fn with_event_channel(
        config: ConsumerConfig,
        store: Arc<PriceStore>,
    ) -> (Self, mpsc::UnboundedReceiver<MarketEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut consumer = Self::new(config, store);
        consumer.events = Some(tx);
        (consumer, rx)
    }

    /// Token that stops connect retries and the current session
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Total connection attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Connect to the configured gateway, retrying per the reconnect policy
    pub async fn connect(&self) -> Result<TcpStream, ConsumerError> {
        let stream = connect_with_retry(
            &self.config.gateway_addr,
            &self.config.reconnect,
            &self.shutdown,
            Some(&self.connect_attempts),
        )
        .await?;
        Ok(stream)
    }

    /// Connect once and consume until the stream ends or shutdown
    pub async fn run(&self) -> Result<SessionEnd, ConsumerError> {
        let stream = self.connect().await?;
        let (end, summary) = self.run_session(stream).await;
        tracing::info!(
            "📥 Session with {} ended ({:?}): {} prices, {} news, {} skipped",
            self.config.gateway_addr,
            end,
            summary.prices,
            summary.news,
            summary.skipped
        );
        Ok(end)
    }

    /// Decode frames from an established connection
    ///
    /// Unparseable frames are counted in the summary and skipped. A transport
    /// failure ends the session as [`SessionEnd::Disconnected`] so the caller
    /// can reconnect.
    pub async fn run_session(&self, stream: TcpStream) -> (SessionEnd, SessionSummary) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.config.gateway_addr.clone());
        let mut frames = FramedRead::new(stream, FrameCodec::new());
        let mut summary = SessionSummary::default();

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => return (SessionEnd::Stopped, summary),
                next = frames.next() => next,
            };

            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(e)) => {
                    tracing::warn!("📥 Lost tick stream from {}: {}", peer, e);
                    return (SessionEnd::Disconnected, summary);
                }
                None => {
                    tracing::warn!("📥 Tick gateway {} closed the stream", peer);
                    return (SessionEnd::PeerClosed, summary);
                }
            };

            let tick = match Tick::from_payload(&payload) {
                Ok(tick) => tick,
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(
                        "📥 Skipping malformed frame from {}: {} ({:?})",
                        peer,
                        e,
                        String::from_utf8_lossy(&payload)
                    );
                    continue;
                }
            };

            self.handle_tick(tick, &mut summary);
        }
    }

    fn handle_tick(&self, tick: Tick, summary: &mut SessionSummary) {
        match &tick {
            Tick::Price { instrument, price } => match self.store.set(instrument, *price) {
                Ok(()) => summary.prices += 1,
                Err(StoreError::UnknownInstrument(name)) => {
                    summary.skipped += 1;
                    tracing::warn!("📥 Ignoring price for untracked instrument {}", name);
                    return;
                }
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!("📥 Rejected price update: {}", e);
                    return;
                }
            },
            Tick::News { sentiment } => {
                summary.news += 1;
                tracing::debug!("📥 News sentiment {}", sentiment);
            }
        }

        if let Some(events) = &self.events {
            // Observer going away does not stop the store from updating
            if events.send(MarketEvent::from_tick(tick)).is_err() {
                tracing::debug!("📥 Event observer dropped");
            }
        }
    }
}
