use std::sync::Arc;

use procure_core::config::{AppConfig, ConfigError, LoadOptions};
use procure_db::{connect_with_config, migrations, DbPool};
use procure_workflow::{
    AccessGuard, ApprovalEngine, DirectoryAccessGuard, EngineRepositories, EngineSettings,
    TracingAuditSink,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<ApprovalEngine>,
    pub guard: Arc<dyn AccessGuard>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repositories = EngineRepositories::sql(db_pool.clone());
    let guard: Arc<dyn AccessGuard> =
        Arc::new(DirectoryAccessGuard::new(repositories.users.clone()));
    let engine = Arc::new(ApprovalEngine::new(
        repositories,
        Arc::new(TracingAuditSink),
        EngineSettings::from(&config.workflow),
    ));
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        rejection_policy = config.workflow.rejection_policy.as_str(),
        default_currency = %config.workflow.default_currency,
        "approval engine initialized"
    );

    Ok(Application { config, db_pool, engine, guard })
}
