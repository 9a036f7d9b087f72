use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mc_manager::api::{ApiServer, ApiState};
use mc_manager::config::PanelConfig;
use mc_manager::events::EventHub;
use mc_manager::protocol::client::ConsoleClient;
use mc_manager::status::StatusProjector;
use mc_manager::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 는 있으면 적용, 없으면 무시
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
    tracing::info!("Minecraft control panel starting (v{})", env!("CARGO_PKG_VERSION"));

    let cfg = PanelConfig::load()?;
    tracing::info!(
        "Managing server at {} (script: {}), RCON {}",
        cfg.server.path,
        cfg.server.start_script,
        cfg.rcon_options().addr()
    );
    if cfg.api.tokens.is_empty() {
        tracing::warn!("No API tokens configured, every request is accepted as 'unknown'");
    }

    let events = EventHub::default();
    let console = Arc::new(ConsoleClient::new(cfg.rcon_options()));
    let supervisor = Arc::new(Supervisor::new(cfg.supervisor_config(), console, events));
    let status = Arc::new(StatusProjector::new(
        supervisor.clone(),
        cfg.status.list_command.clone(),
        cfg.status.tps_commands.clone(),
    ));

    let state = ApiState::new(supervisor.clone(), status, cfg.api.tokens.clone());
    let server = ApiServer::new(state, &cfg.bind_addr());

    // Ctrl+C: stop accepting requests, then take the server down
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received, cleaning up...");
    };

    if let Err(e) = server.serve(shutdown).await {
        tracing::error!("HTTP server error: {}", e);
    }

    tracing::info!("Stopping managed server before exit");
    if let Err(e) = supervisor.shutdown().await {
        tracing::error!("Failed to stop server on shutdown: {}", e);
    }

    tracing::info!("Control panel shut down");
    Ok(())
}
