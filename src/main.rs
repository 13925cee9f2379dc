use std::process::ExitCode;
use std::sync::Arc;

use tick_relay::config::{ConsumerConfig, OrderRelayConfig};
use tick_relay::market_data::SessionEnd;
use tick_relay::telemetry::{init_tracing, DEFAULT_FILTER};
use tick_relay::{
    AppConfig, DecisionEngine, OrderRelayServer, PriceStore, TickBroadcaster, TickConsumer, Trader,
};

/// Gateway, order relay, consumer and trader in a single process
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(DEFAULT_FILTER);

    // Reads .env (if present) and the process environment
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let broadcaster = TickBroadcaster::new(config.gateway.clone());
    let gateway_addr = match broadcaster.start().await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let relay = OrderRelayServer::new(config.relay.clone());
    let relay_addr = match relay.start().await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("❌ {}", e);
            broadcaster.stop().await;
            return ExitCode::FAILURE;
        }
    };

    // Point the in-process clients at the addresses actually bound
    let consumer_config = ConsumerConfig {
        gateway_addr: gateway_addr.to_string(),
        ..config.consumer.clone()
    };
    let relay_config = OrderRelayConfig {
        host: relay_addr.ip().to_string(),
        port: relay_addr.port(),
        ..config.relay.clone()
    };

    let store = Arc::new(PriceStore::with_instruments(
        config.gateway.instruments.iter().cloned(),
    ));
    let (consumer, events) = TickConsumer::with_event_channel(consumer_config, store.clone());
    let trader = Trader::new(DecisionEngine::new(config.decision.clone()), relay_config);

    let consumer_stop = consumer.shutdown_token();
    let trader_stop = trader.shutdown_token();

    let consumer_task = tokio::spawn(async move {
        match consumer.run().await {
            Ok(SessionEnd::Stopped) => {}
            Ok(SessionEnd::PeerClosed | SessionEnd::Disconnected) => {
                tracing::warn!("⚠️ Tick stream ended")
            }
            Err(e) => tracing::error!("❌ Tick consumer failed: {}", e),
        }
    });
    let trader_task = tokio::spawn(trader.run(events));

    tracing::info!("🚀 tick-relay running: ticks on {}, orders on {}", gateway_addr, relay_addr);
    tracing::info!("   Press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("🛑 Shutting down");

    consumer_stop.cancel();
    trader_stop.cancel();
    let _ = consumer_task.await;
    if let Ok(summary) = trader_task.await {
        tracing::info!("🤖 Trader summary: {:?}", summary);
    }

    broadcaster.stop().await;
    relay.stop().await;

    tracing::info!("📡 Gateway stats: {:?}", broadcaster.get_stats());
    tracing::info!("🧾 Relay stats: {:?}", relay.get_stats());
    tracing::info!("💾 Last prices: {:?}", store.snapshot());

    ExitCode::SUCCESS
}
