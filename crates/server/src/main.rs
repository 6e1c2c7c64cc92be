mod bootstrap;
mod health;
mod webhooks;

use anyhow::Result;
use ticketrelay_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use ticketrelay_core::config::LogFormat::*;
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
    // A missing .env is normal outside local development.
    let dotenv = dotenvy::dotenv();

    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);
    if let Err(error) = dotenv {
        tracing::debug!(
            event_name = "system.server.dotenv_skipped",
            correlation_id = "bootstrap",
            error = %error,
            ".env file not loaded"
        );
    }

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let state = webhooks::RelayState::new(app.service, app.verifier);
    let in_flight = state.in_flight();
    let router = webhooks::router(state).merge(health::router(app.db_pool.clone()));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "ticket relay listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "ticket relay stopping"
    );

    let drained = in_flight.drain().await;
    tracing::info!(
        event_name = "system.server.drained",
        correlation_id = "shutdown",
        drained,
        "pending interactive actions finished"
    );

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c; shutting down"
        );
    }
}
