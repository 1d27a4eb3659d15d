use procure_core::config::{AppConfig, LoadOptions};
use procure_db::connection::ping;
use procure_db::repositories::{DepartmentRepository, SqlDepartmentRepository};
use procure_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_VERIFICATION};

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: [&str; 3] = ["database_connectivity", "migrations_current", "approval_registry"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_VERIFICATION };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(DATABASE_CHECKS.into_iter().map(|name| {
                DoctorCheck::skipped(name, "skipped because configuration did not load")
            }));
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

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("migrations_current", "skipped because database is unreachable"),
                    DoctorCheck::skipped("approval_registry", "skipped because database is unreachable"),
                ];
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            Err(error) => DoctorCheck::fail("database_connectivity", format!("ping failed: {error}")),
        };
        let migrations = migration_check(&pool).await;
        let registry = if migrations.status == CheckStatus::Pass {
            registry_check(&pool).await
        } else {
            DoctorCheck::skipped("approval_registry", "skipped because migrations are not current")
        };

        pool.close().await;
        vec![connectivity, migrations, registry]
    })
}

async fn migration_check(pool: &DbPool) -> DoctorCheck {
    let embedded = migrations::embedded_count();
    match migrations::applied_count(pool).await {
        Ok(applied) if usize::try_from(applied).unwrap_or_default() >= embedded => {
            DoctorCheck::pass("migrations_current", format!("{applied}/{embedded} migrations applied"))
        }
        Ok(applied) => DoctorCheck::fail(
            "migrations_current",
            format!("{applied}/{embedded} migrations applied; run `procure migrate`"),
        ),
        Err(error) => {
            DoctorCheck::fail("migrations_current", format!("migration state unavailable: {error}"))
        }
    }
}

async fn registry_check(pool: &DbPool) -> DoctorCheck {
    let departments =
        match SqlDepartmentRepository::new(pool.clone()).list_approval_departments().await {
            Ok(departments) => departments,
            Err(error) => {
                return DoctorCheck::fail(
                    "approval_registry",
                    format!("department registry unavailable: {error}"),
                )
            }
        };

    if departments.is_empty() {
        return DoctorCheck::fail(
            "approval_registry",
            "no approval-requiring departments are configured; run `procure seed` or register departments",
        );
    }
    if let Some(department) = departments.iter().find(|department| department.approval_order == 0) {
        return DoctorCheck::fail(
            "approval_registry",
            format!("department `{}` requires approval but has approval order 0", department.code),
        );
    }

    let chain = departments
        .iter()
        .map(|department| format!("{}#{}", department.code, department.approval_order))
        .collect::<Vec<_>>()
        .join(" > ");
    DoctorCheck::pass("approval_registry", format!("approval chain: {chain}"))
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
