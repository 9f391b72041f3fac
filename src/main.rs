// src/main.rs - roti-host entry point
use clap::Parser;
use roti_host::config::{self, Config};
use roti_host::device::HttpDeviceClient;
use roti_host::notify::Notifier;
use roti_host::web;
use roti_host::Controller;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Host controller for an automated roti maker
#[derive(Parser, Debug)]
#[command(name = "roti-host", version)]
struct Cli {
    /// Path to a TOML config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API listen address from the config
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    tracing::info!("Starting roti-host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy();
            tracing::info!("Loading configuration from: {}", path);
            config::load_config(&path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path, e);
                tracing::error!("Please ensure the configuration file exists and is properly formatted");
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    tracing::info!("Device: {}", config.device.base_url);
    tracing::info!("Request timeout: {} ms, retries: {}", config.device.request_timeout_ms, config.device.retries);
    tracing::info!("Telemetry poll: {} ms, run tick: {} ms", config.telemetry.poll_interval_ms, config.run.tick_interval_ms);

    let client = Arc::new(HttpDeviceClient::new(&config.device)?);
    let notifier = Notifier::new();
    let controller = Controller::new(&config, client.clone(), client, notifier).spawn();

    // Graceful shutdown waits for open connections, so event streams must end first
    let (shutdown_tx, _) = broadcast::channel(1);
    let app = web::api::create_router(controller.sender(), controller.notifier(), shutdown_tx.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        })
        .await?;

    controller.shutdown().await;
    tracing::info!("roti-host stopped");
    Ok(())
}
