mod bootstrap;
mod reminder;
mod worker;

use anyhow::Result;
use sliceline_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use sliceline_core::config::LogFormat::*;
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

async fn run() -> Result<()> {
    // Config first: a missing credential must fail before anything serves.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    tracing::info!(event_name = "system.server.started", "sliceline-server started");

    tokio::select! {
        result = app.runner.start() => {
            result?;
            tracing::warn!(
                event_name = "system.server.poll_ended",
                "update polling ended; shutting down"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(event_name = "system.server.stopping", "sliceline-server stopping");
        }
    }

    Ok(())
}
