use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use ticketrelay_core::config::{AppConfig, ConfigError};
use ticketrelay_core::TicketService;
use ticketrelay_db::{connect_with_settings, migrations, DbPool, SqlTicketStore};
use ticketrelay_slack::{
    EndpointError, RequestVerifier, SlackApiClient, SlackApiError, SlackEndpoints,
};
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: TicketService,
    pub verifier: RequestVerifier,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack endpoint configuration is invalid: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("slack client could not be built: {0}")]
    SlackClient(#[from] SlackApiError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let endpoints =
        SlackEndpoints::from_settings(config.slack.api_url.as_deref(), config.slack.env.as_deref())?;
    info!(
        event_name = "system.bootstrap.slack_endpoints",
        correlation_id = "bootstrap",
        api_base = %endpoints.base_url(),
        "slack api base resolved"
    );

    let slack = Arc::new(SlackApiClient::new(
        endpoints,
        config.slack.bot_token.clone(),
        Duration::from_secs(config.slack.timeout_secs),
    )?);
    let store = Arc::new(SqlTicketStore::new(db_pool.clone()));
    let service =
        TicketService::new(store, slack.clone(), slack, config.slack.webhook_url.clone());
    let verifier = RequestVerifier::new(
        config.slack.verification_token.clone(),
        config.slack.signing_secret.clone(),
    );

    Ok(Application { config, db_pool, service, verifier })
}
