use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::commands::CommandResult;
use leadrobin_core::config::{AppConfig, LoadOptions};
use leadrobin_db::repositories::{
    SqlAuditLogRepository, SqlLeadRepository, SqlPoolRepository, SqlUserRepository,
};
use leadrobin_db::{connect_with_settings, migrations};
use leadrobin_engine::{AcceptanceMonitor, LeadService, ScanSummary};
use leadrobin_notify::build_notifier;

/// One acceptance-deadline sweep, the same pass the server's monitor runs
/// on its interval. Useful when the monitor is disabled or a backlog needs
/// clearing right now.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let notifier = build_notifier(&config.notifier)
            .map_err(|error| ("notifier_init", error.to_string(), 6u8))?;

        let leads = Arc::new(SqlLeadRepository::new(pool.clone()));
        let pools = Arc::new(SqlPoolRepository::new(pool.clone()));
        let users = Arc::new(SqlUserRepository::new(pool.clone()));
        let log = Arc::new(SqlAuditLogRepository::new(pool.clone()));

        let service =
            Arc::new(LeadService::new(leads, pools, users, log.clone(), log, notifier));
        let monitor =
            AcceptanceMonitor::new(service, Duration::from_secs(config.monitor.scan_interval_secs));

        let summary = monitor.scan_once(Utc::now()).await;
        pool.close().await;
        Ok::<ScanSummary, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => {
            let message = format!(
                "expiry sweep finished: {} scanned, {} reassigned, {} returned to queue, {} skipped, {} failed",
                summary.scanned,
                summary.reassigned,
                summary.unassigned,
                summary.skipped,
                summary.failed,
            );
            if summary.failed > 0 {
                CommandResult::failure("sweep", "sweep_incomplete", message, 7)
            } else {
                CommandResult::success("sweep", message)
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
