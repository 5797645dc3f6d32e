use leadrobin_core::config::{AppConfig, LoadOptions, NotifierMode};
use leadrobin_db::{connect_with_settings, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_notifier_readiness(&config));
            let (connectivity, migration_status) = check_database(&config);
            checks.push(connectivity);
            checks.push(migration_status);
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "notifier_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(migration_skipped("skipped because configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notifier_readiness(config: &AppConfig) -> DoctorCheck {
    let details = match config.notifier.mode {
        NotifierMode::Noop => "noop mode: assignment notices are skipped".to_string(),
        NotifierMode::Http => "relay endpoint and sender validated by config contract".to_string(),
    };
    DoctorCheck { name: "notifier_readiness", status: CheckStatus::Pass, details }
}

fn check_database(config: &AppConfig) -> (DoctorCheck, DoctorCheck) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return (
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                migration_skipped("skipped because the database check did not run"),
            );
        }
    };

    let pool = match runtime.block_on(connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )) {
        Ok(pool) => pool,
        Err(error) => {
            return (
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                },
                migration_skipped("skipped because the database is unreachable"),
            );
        }
    };

    let connectivity = DoctorCheck {
        name: "database_connectivity",
        status: CheckStatus::Pass,
        details: format!("connected using `{}`", config.database.url),
    };

    let migration_status = match runtime.block_on(migrations::pending_versions(&pool)) {
        Ok(pending) if pending.is_empty() => DoctorCheck {
            name: "migration_status",
            status: CheckStatus::Pass,
            details: "all embedded migrations applied".to_string(),
        },
        Ok(pending) => DoctorCheck {
            name: "migration_status",
            status: CheckStatus::Fail,
            details: format!("{} migrations pending, run `leadrobin migrate`", pending.len()),
        },
        Err(error) => DoctorCheck {
            name: "migration_status",
            status: CheckStatus::Fail,
            details: format!("failed to read applied migrations: {error}"),
        },
    };

    runtime.block_on(pool.close());
    (connectivity, migration_status)
}

fn migration_skipped(details: &str) -> DoctorCheck {
    DoctorCheck {
        name: "migration_status",
        status: CheckStatus::Skipped,
        details: details.to_string(),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
