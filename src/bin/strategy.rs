use std::process::ExitCode;
use std::sync::Arc;

use tick_relay::market_data::SessionEnd;
use tick_relay::telemetry::{init_tracing, DEFAULT_FILTER};
use tick_relay::{AppConfig, DecisionEngine, PriceStore, TickConsumer, Trader};

/// Consumer and trader against a remote gateway and order relay
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(DEFAULT_FILTER);

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(PriceStore::new());
    let (consumer, events) = TickConsumer::with_event_channel(config.consumer.clone(), store.clone());
    let trader = Trader::new(DecisionEngine::new(config.decision.clone()), config.relay.clone());

    let consumer_stop = consumer.shutdown_token();
    let trader_stop = trader.shutdown_token();
    let trader_task = tokio::spawn(trader.run(events));

    // A closed stream ends the session; start a new one until told to stop
    let mut consumer_task = tokio::spawn(async move {
        loop {
            match consumer.run().await {
                Ok(SessionEnd::PeerClosed | SessionEnd::Disconnected) => {
                    tracing::warn!("⚠️ Disconnected from gateway, reconnecting");
                }
                Ok(SessionEnd::Stopped) => return true,
                Err(e) => {
                    tracing::error!("❌ Tick consumer failed: {}", e);
                    return false;
                }
            }
        }
    });

    tracing::info!(
        "🚀 Strategy running: ticks from {}, orders to {}",
        config.consumer.gateway_addr,
        config.relay.addr()
    );

    let consumer_ok = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!("❌ Failed to listen for Ctrl+C: {}", e);
            }
            consumer_stop.cancel();
            consumer_task.await.unwrap_or(false)
        }
        finished = &mut consumer_task => finished.unwrap_or(false),
    };

    trader_stop.cancel();
    if let Ok(summary) = trader_task.await {
        tracing::info!("🤖 Trader summary: {:?}", summary);
    }
    tracing::info!("💾 Last prices: {:?}", store.snapshot());

    if consumer_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
