use std::process::ExitCode;

use tick_relay::telemetry::{init_tracing, DEFAULT_FILTER};
use tick_relay::{AppConfig, TickBroadcaster};

/// Synthetic tick gateway on its own
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

    let broadcaster = TickBroadcaster::new(config.gateway);
    let addr = match broadcaster.start().await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("🚀 Tick gateway running on {}", addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for Ctrl+C: {}", e);
    }

    broadcaster.stop().await;
    tracing::info!("📡 Final stats: {:?}", broadcaster.get_stats());
    ExitCode::SUCCESS
}
