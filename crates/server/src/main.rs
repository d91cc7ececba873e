mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use rosterbot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use rosterbot_core::config::LogFormat::*;
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
    // Logging must be up before the dataset load reports anything.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Dataset and access-list loading read files.
    let app =
        tokio::task::spawn_blocking(move || bootstrap::bootstrap_with_config(config)).await??;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::OpsState::new(app.catalog.clone(), app.loader.clone(), app.runner.health()),
    )
    .await?;

    let runner = app.runner;
    let mut polling = tokio::spawn(async move { runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        dataset_path = %app.config.dataset.path.display(),
        "rosterbot-server started"
    );

    let shutdown_requested = tokio::select! {
        finished = &mut polling => {
            match finished {
                Ok(Ok(())) => tracing::warn!(
                    event_name = "system.server.polling_stopped",
                    correlation_id = "shutdown",
                    "update stream closed; ops endpoint stays up until shutdown"
                ),
                Ok(Err(error)) => tracing::error!(
                    event_name = "system.server.polling_failed",
                    correlation_id = "shutdown",
                    error = %error,
                    "polling runner gave up; ops endpoint stays up until shutdown"
                ),
                Err(error) => tracing::error!(
                    event_name = "system.server.polling_panicked",
                    correlation_id = "shutdown",
                    error = %error,
                    "polling task aborted"
                ),
            }
            false
        }
        signal = wait_for_shutdown() => {
            signal?;
            true
        }
    };

    if shutdown_requested {
        polling.abort();
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, polling).await.is_err() {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "polling task did not stop within the grace period"
            );
        }
    } else {
        wait_for_shutdown().await?;
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_conversations = app.service.sessions().active().await,
        "rosterbot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
