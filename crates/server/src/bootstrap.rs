use std::sync::Arc;
use std::time::Duration;

use leadrobin_core::config::{AppConfig, ConfigError, LoadOptions};
use leadrobin_db::repositories::{
    SqlAuditLogRepository, SqlLeadRepository, SqlPoolRepository, SqlUserRepository,
};
use leadrobin_db::{connect_with_settings, migrations, DbPool};
use leadrobin_engine::{AcceptanceMonitor, LeadService, PoolService};
use leadrobin_notify::{build_notifier, DispatchError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub lead_service: Arc<LeadService>,
    pub pool_service: Arc<PoolService>,
    pub monitor: Option<AcceptanceMonitor>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notifier construction failed: {0}")]
    Notifier(#[source] DispatchError),
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

    let notifier = build_notifier(&config.notifier).map_err(BootstrapError::Notifier)?;
    info!(
        event_name = "system.bootstrap.notifier_ready",
        correlation_id = "bootstrap",
        mode = ?config.notifier.mode,
        "assignment notifier constructed"
    );

    let leads = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let pools = Arc::new(SqlPoolRepository::new(db_pool.clone()));
    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    // One audit repository serves both the audit trail and the notification log.
    let log = Arc::new(SqlAuditLogRepository::new(db_pool.clone()));

    let lead_service = Arc::new(LeadService::new(
        leads,
        pools.clone(),
        users.clone(),
        log.clone(),
        log,
        notifier,
    ));
    let pool_service = Arc::new(PoolService::new(pools, users));

    let monitor = config.monitor.enabled.then(|| {
        AcceptanceMonitor::new(
            lead_service.clone(),
            Duration::from_secs(config.monitor.scan_interval_secs),
        )
    });

    Ok(Application { config, db_pool, lead_service, pool_service, monitor })
}
