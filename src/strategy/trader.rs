use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::decision::{Decision, DecisionEngine};
use crate::config::OrderRelayConfig;
use crate::error::RelayError;
use crate::models::{Confirmation, MarketEvent, Order};
use crate::relay::OrderClient;

/// What a trader did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraderSummary {
    pub prices_seen: u64,
    /// Prices not evaluated because the relay was unreachable
    pub prices_skipped: u64,
    pub news_seen: u64,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
    pub submit_failures: u64,
}

/// Drives a [`DecisionEngine`] from market events and submits its orders
///
/// The relay connection is opened on the first order and reopened after it
/// is lost, with the relay's finite connect policy. When connecting fails,
/// prices arriving during the next retry interval are counted and dropped
/// without being evaluated, so the event backlog drains instead of piling
/// up behind more connect attempts.
///
/// Positions follow the engine's decisions even when a submit fails or is
/// rejected.
pub struct Trader {
    engine: DecisionEngine,
    relay: OrderRelayConfig,
    client: Option<OrderClient>,
    /// Set after a failed connect; prices before this instant are skipped
    relay_down_until: Option<Instant>,
    shutdown: CancellationToken,
    summary: TraderSummary,
}

impl Trader {
    pub fn new(engine: DecisionEngine, relay: OrderRelayConfig) -> Self {
        Self {
            engine,
            relay,
            client: None,
            relay_down_until: None,
            shutdown: CancellationToken::new(),
            summary: TraderSummary::default(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn summary(&self) -> &TraderSummary {
        &self.summary
    }

    /// Consume events until the channel closes or shutdown is requested
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<MarketEvent>) -> TraderSummary {
        tracing::info!(
            "🤖 Trader running (buy < {}, sell > {}, lot {})",
            self.engine.config().buy_threshold,
            self.engine.config().sell_threshold,
            self.engine.config().lot_size
        );

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_event(event).await;
        }

        tracing::info!("🤖 Trader stopped: {:?}", self.summary);
        self.summary
    }

    /// Evaluate one event and, if the engine decides to trade, submit the order
    pub async fn handle_event(&mut self, event: MarketEvent) -> Option<Confirmation> {
        match event {
            MarketEvent::News { sentiment, .. } => {
                self.summary.news_seen += 1;
                tracing::info!("📰 News sentiment: {}", sentiment);
                None
            }
            MarketEvent::Price {
                instrument, price, ..
            } => {
                self.summary.prices_seen += 1;
                tracing::debug!("📊 {} price: {:.2}", instrument, price);

                if self.relay_unavailable() {
                    self.summary.prices_skipped += 1;
                    tracing::debug!("⏸️ Relay unavailable, skipping {} at {:.2}", instrument, price);
                    return None;
                }

                match self.engine.evaluate(&instrument, price) {
                    Decision::Hold => None,
                    Decision::Submit(order) => self.submit(order).await,
                }
            }
        }
    }

    async fn submit(&mut self, order: Order) -> Option<Confirmation> {
        tracing::info!("📤 Sending order: {}", order);

        match self.try_submit(&order).await {
            Ok(confirmation) => {
                match &confirmation {
                    Confirmation::Accepted(_) => {
                        self.summary.orders_accepted += 1;
                        tracing::info!("✅ Confirmed: {}", order);
                    }
                    Confirmation::Rejected { reason } => {
                        self.summary.orders_rejected += 1;
                        tracing::warn!("❌ Rejected {}: {}", order, reason);
                    }
                }
                Some(confirmation)
            }
            Err(e) => {
                self.summary.submit_failures += 1;
                tracing::error!("⚠️ Failed to submit {}: {}", order, e);
                if e.is_connection_lost() {
                    self.client = None;
                }
                if matches!(e, RelayError::Connect(_)) {
                    let backoff = self.relay.reconnect.retry_interval();
                    tracing::warn!("⏸️ Relay unreachable, skipping prices for {:?}", backoff);
                    self.relay_down_until = Some(Instant::now() + backoff);
                }
                None
            }
        }
    }

    fn relay_unavailable(&mut self) -> bool {
        match self.relay_down_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                self.relay_down_until = None;
                false
            }
            None => false,
        }
    }

    async fn try_submit(&mut self, order: &Order) -> Result<Confirmation, RelayError> {
        let client = match &mut self.client {
            Some(client) => client,
            slot => slot.insert(OrderClient::connect(&self.relay, &self.shutdown).await?),
        };
        client.submit(order).await
    }
}
