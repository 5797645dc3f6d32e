mod bootstrap;
mod health;

use anyhow::Result;
use leadrobin_core::config::{AppConfig, LoadOptions};
use leadrobin_engine::AcceptanceMonitor;

fn init_logging(config: &AppConfig) {
    use leadrobin_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let mut app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.config.monitor.clone(),
    )
    .await?;

    let monitor_handle = app.monitor.take().map(AcceptanceMonitor::spawn);
    tracing::info!(
        event_name = "system.server.monitor_mode",
        monitor_mode = if monitor_handle.is_some() { "running" } else { "disabled" },
        correlation_id = "bootstrap",
        "acceptance timeout monitor initialized"
    );

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "leadrobin-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "leadrobin-server stopping"
    );

    if let Some(handle) = monitor_handle {
        let grace = std::time::Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, handle.stop()).await.is_err() {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                "monitor did not stop within the grace period"
            );
        }
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
