//! CLI entry point for the simulated maker firmware.

use clap::Parser;
use roti_host::sim::{SimDevice, SimOptions};

/// Device Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "device-sim", about = "Serves the roti maker's HTTP API with simulated telemetry.")]
pub struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    bind: String,

    /// Probability that a status request fails with 503
    #[arg(long, default_value_t = 0.1)]
    drop_rate: f64,

    /// Answer emergency stops with `acknowledged: false`
    #[arg(long)]
    ignore_stop: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    if !(0.0..=1.0).contains(&cli.drop_rate) {
        return Err(format!("--drop-rate must be within [0, 1], got {}", cli.drop_rate).into());
    }

    let device = SimDevice::new(SimOptions {
        drop_rate: cli.drop_rate,
        acknowledge_stop: !cli.ignore_stop,
    });

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!("Simulated device listening on http://{}", listener.local_addr()?);
    axum::serve(listener, device.router()).await?;

    Ok(())
}
