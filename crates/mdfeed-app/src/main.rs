//! Market-data feed client - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Stream Binance market data into logs and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MDFEED_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is made.
    mdfeed_ws::init_crypto();

    let args = Args::parse();

    mdfeed_telemetry::init_logging()?;

    info!("Starting mdfeed v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > MDFEED_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("MDFEED_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = mdfeed_app::AppConfig::from_file(&config_path)?;

    let app = mdfeed_app::Application::new(config)?;
    app.run().await?;

    Ok(())
}
