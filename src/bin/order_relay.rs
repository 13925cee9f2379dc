use std::process::ExitCode;

use tick_relay::telemetry::{init_tracing, DEFAULT_FILTER};
use tick_relay::{AppConfig, OrderRelayServer};

/// Order confirmation service on its own
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

    let server = OrderRelayServer::new(config.relay);
    let addr = match server.start().await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("🚀 Order relay running on {}", addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for Ctrl+C: {}", e);
    }

    server.stop().await;
    tracing::info!("🧾 Final stats: {:?}", server.get_stats());
    ExitCode::SUCCESS
}
