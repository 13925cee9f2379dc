use bytes::Bytes;
use futures::SinkExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::price_walk::PriceWalk;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::Tick;
use crate::protocol::{FrameCodec, WireMessage};

/// Lifecycle of a [`TickBroadcaster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BroadcasterState {
    /// Created, not yet bound
    Init,
    /// Accepting subscribers and generating ticks
    Listening,
    /// Stopped; cannot be restarted
    Stopped,
}

/// Statistics for the tick broadcaster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcasterStats {
    /// Currently connected subscribers
    pub subscriber_count: usize,
    /// Ticks framed and fanned out (lifetime)
    pub ticks_published: u64,
    /// Frames written to subscriber sockets (lifetime)
    pub frames_delivered: u64,
    /// Subscribers removed after disconnecting, failing a write or falling behind
    pub subscribers_evicted: u64,
    /// Connections refused because the subscriber limit was reached
    pub connections_rejected: u64,
}

struct Subscriber {
    peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Counters {
    ticks_published: AtomicU64,
    frames_delivered: AtomicU64,
    subscribers_evicted: AtomicU64,
    connections_rejected: AtomicU64,
}

/// Synthetic tick gateway
///
/// Listens for subscriber connections and, on an independent timer, advances
/// a [`PriceWalk`] and fans the resulting PRICE and NEWS frames out to every
/// subscriber connected at that moment.
///
/// Each subscriber gets its own task and a bounded frame queue. A subscriber
/// whose queue fills up, whose socket write fails or times out, or that
/// closes its end is removed without affecting anyone else.
///
/// # Example
/// ```ignore
/// let broadcaster = TickBroadcaster::new(config.gateway.clone());
/// let addr = broadcaster.start().await?;
/// tracing::info!("serving ticks on {}", addr);
///
/// tokio::signal::ctrl_c().await?;
/// broadcaster.stop().await;
/// ```
pub struct TickBroadcaster {
    config: Arc<GatewayConfig>,

    /// Active subscribers by connection id
    subscribers: Arc<RwLock<HashMap<u64, Subscriber>>>,

    next_id: Arc<AtomicU64>,

    counters: Arc<Counters>,

    state: Arc<Mutex<BroadcasterState>>,

    /// Cancelled by `stop`; every subscriber token is a child of it
    shutdown: CancellationToken,

    tasks: TaskTracker,
}

impl TickBroadcaster {
    pub fn new(config: GatewayConfig) -> Self {
        tracing::info!(
            "📡 TickBroadcaster created for {} instrument(s)",
            config.instruments.len()
        );

        Self {
            config: Arc::new(config),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            counters: Arc::new(Counters::default()),
            state: Arc::new(Mutex::new(BroadcasterState::Init)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Bind the listening socket and spawn the accept and generation loops
    ///
    /// Returns the bound address (useful with port 0). Failing to bind is
    /// the only fatal error; a broadcaster can only be started once.
    pub async fn start(&self) -> Result<SocketAddr, GatewayError> {
        {
            let mut state = self.state.lock();
            if *state != BroadcasterState::Init {
                return Err(GatewayError::AlreadyStarted);
            }
            *state = BroadcasterState::Listening;
        }

        let addr = self.config.addr();
        let bound = match TcpListener::bind(&addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                *self.state.lock() = BroadcasterState::Init;
                return Err(GatewayError::Bind { addr, source });
            }
        };

        let walk = match self.config.seed {
            Some(seed) => PriceWalk::seeded(self.config.instruments.iter().cloned(), seed),
            None => PriceWalk::new(self.config.instruments.iter().cloned()),
        };

        self.tasks.spawn(self.clone().accept_loop(listener));
        self.tasks.spawn(self.clone().generation_loop(walk));

        tracing::info!("📡 TickBroadcaster listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting, close every subscriber and halt the timers
    ///
    /// Safe to call more than once; returns after all tasks have finished.
    pub async fn stop(&self) {
        let was = std::mem::replace(&mut *self.state.lock(), BroadcasterState::Stopped);

        self.shutdown.cancel();
        self.subscribers.write().clear();
        self.tasks.close();
        self.tasks.wait().await;

        if was != BroadcasterState::Stopped {
            tracing::info!("📡 TickBroadcaster stopped");
        }
    }

    /// Frame a tick and queue it for every current subscriber
    ///
    /// Returns how many subscribers the frame was queued for. Subscribers
    /// whose queue is full or closed are evicted.
    pub fn publish(&self, tick: &Tick) -> Result<usize, GatewayError> {
        let frame = tick.to_payload()?;
        self.counters.ticks_published.fetch_add(1, Ordering::Relaxed);

        // Snapshot under the read lock, send without holding it
        let targets: Vec<(u64, SocketAddr, mpsc::Sender<Bytes>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sub)| (*id, sub.peer, sub.tx.clone()))
            .collect();

        let mut queued = 0;
        let mut lagging = Vec::new();

        for (id, peer, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("📡 Subscriber {} fell behind, evicting", peer);
                    lagging.push(id);
                }
                Err(TrySendError::Closed(_)) => lagging.push(id),
            }
        }

        if !lagging.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in lagging {
                if let Some(sub) = subscribers.remove(&id) {
                    sub.cancel.cancel();
                    self.counters.subscribers_evicted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        Ok(queued)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn state(&self) -> BroadcasterState {
        *self.state.lock()
    }

    pub fn get_stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            subscriber_count: self.subscriber_count(),
            ticks_published: self.counters.ticks_published.load(Ordering::Relaxed),
            frames_delivered: self.counters.frames_delivered.load(Ordering::Relaxed),
            subscribers_evicted: self.counters.subscribers_evicted.load(Ordering::Relaxed),
            connections_rejected: self.counters.connections_rejected.load(Ordering::Relaxed),
        }
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.register(stream, peer),
                Err(e) => tracing::warn!("📡 Accept failed: {}", e),
            }
        }

        tracing::debug!("📡 Accept loop ended");
    }

    fn register(&self, stream: TcpStream, peer: SocketAddr) {
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue);
        let cancel = self.shutdown.child_token();

        let id = {
            let mut subscribers = self.subscribers.write();
            if subscribers.len() >= self.config.max_subscribers {
                drop(subscribers);
                self.counters.connections_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "📡 Rejecting {}: subscriber limit {} reached",
                    peer,
                    self.config.max_subscribers
                );
                return;
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            subscribers.insert(
                id,
                Subscriber {
                    peer,
                    tx,
                    cancel: cancel.clone(),
                },
            );
            id
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("📡 Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        tracing::info!("📡 Subscriber connected: {} (id {})", peer, id);
        self.tasks
            .spawn(self.clone().serve_subscriber(id, peer, stream, rx, cancel));
    }

    async fn serve_subscriber(
        self,
        id: u64,
        peer: SocketAddr,
        stream: TcpStream,
        mut rx: mpsc::Receiver<Bytes>,
        cancel: CancellationToken,
    ) {
        let (mut reader, writer) = stream.into_split();
        let mut frames = FramedWrite::new(writer, FrameCodec::new());
        let write_timeout = self.config.write_timeout();
        // Subscribers are not expected to send anything; reads only detect close
        let mut scratch = [0u8; 256];

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break "closed by broadcaster",
                frame = rx.recv() => {
                    let Some(frame) = frame else {
                        break "queue closed";
                    };
                    // A blocked write must not hold up stop()
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break "closed by broadcaster",
                        sent = tokio::time::timeout(write_timeout, frames.send(frame)) => sent,
                    };
                    match sent {
                        Ok(Ok(())) => {
                            self.counters.frames_delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            tracing::warn!("📡 Write to {} failed: {}", peer, e);
                            break "write failed";
                        }
                        Err(_) => break "write timed out",
                    }
                }
                read = reader.read(&mut scratch) => match read {
                    Ok(0) => break "peer closed",
                    Ok(n) => tracing::debug!("📡 Ignoring {} bytes from subscriber {}", n, peer),
                    Err(e) => {
                        tracing::warn!("📡 Read from {} failed: {}", peer, e);
                        break "read failed";
                    }
                },
            }
        };

        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            self.counters.subscribers_evicted.fetch_add(1, Ordering::Relaxed);
        }

        tracing::info!("📡 Subscriber {} (id {}) removed: {}", peer, id, reason);
    }

    async fn generation_loop(self, mut walk: PriceWalk) {
        let tick_every = self.config.tick_interval();
        let news_every = self.config.news_interval();

        let mut tick_timer = interval_at(Instant::now() + tick_every, tick_every);
        let mut news_timer = interval_at(Instant::now() + news_every, news_every);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        news_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "📡 Generating ticks every {:?}, news every {:?}",
            tick_every,
            news_every
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tick_timer.tick() => {
                    for tick in walk.advance() {
                        self.publish_logged(&tick);
                    }
                }
                _ = news_timer.tick() => {
                    let news = walk.sentiment();
                    self.publish_logged(&news);
                }
            }
        }

        tracing::debug!("📡 Generation loop ended");
    }

    fn publish_logged(&self, tick: &Tick) {
        if let Err(e) = self.publish(tick) {
            tracing::error!("📡 Failed to publish {:?}: {}", tick, e);
        }
    }
}

impl Clone for TickBroadcaster {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
            counters: Arc::clone(&self.counters),
            state: Arc::clone(&self.state),
            shutdown: self.shutdown.clone(),
            tasks: self.tasks.clone(),
        }
    }
}
