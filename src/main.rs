//! Ensemble Scoring Server - Main Entry Point
//!
//! Loads the configured models, serves verdicts over TCP and shuts down
//! gracefully on Ctrl-C.

use anyhow::{Context, Result};
use ensemble_scoring_server::config::{AppConfig, LogFormat, LoggingConfig, DEFAULT_CONFIG_PATH};
use ensemble_scoring_server::ScoringServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration path may be given as the only argument
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_tracing(&config.logging)?;

    info!("Starting Ensemble Scoring Server");
    info!(
        path = %config_path,
        models = config.models.len(),
        pass_score = config.scoring.pass_score,
        anomaly_threshold = config.scoring.anomaly_threshold,
        "Configuration loaded successfully"
    );

    let server = ScoringServer::start(&config)
        .await
        .context("Server startup aborted")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    server.stop().await;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG takes precedence over the configured level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level '{}'", logging.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }

    Ok(())
}
