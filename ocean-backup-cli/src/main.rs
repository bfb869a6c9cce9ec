/*!
OceanBackup CLI - snapshot rotation for DigitalOcean droplets and volumes.

Meant to be run from cron or a systemd timer. `run` (the default) performs one
backup pass; `plan` and `list` only read from the API.
*/

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ocean_backup_core::{
    create_digitalocean_provider, observability, BackupConfig, BackupReport, BackupRunner,
    ResourcePlan, SnapshotNamePattern,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ocean-backup")]
#[command(about = "Rotating snapshots for DigitalOcean droplets and volumes")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/ocean_backup.toml, then /etc/ocean_backup.toml)
    #[arg(short, long, global = true, env = "OCEAN_BACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// DigitalOcean API token, overrides `token` from the config file
    #[arg(long, global = true, env = "OCEAN_BACKUP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot every configured resource and prune expired backups
    Run {
        /// Write Prometheus metrics to this file after the pass
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },
    /// Show what a backup pass would delete or transfer, without changing anything
    Plan,
    /// List the snapshots of every configured resource
    List,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Deleted")]
    deleted: usize,
    #[tabled(rename = "Transferred")]
    transferred: usize,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Snapshot")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Action")]
    action: String,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Regions")]
    regions: String,
    #[tabled(rename = "Managed")]
    managed: String,
}

fn main() -> Result<ExitCode, anyhow::Error> {
    let cli = Cli::parse();

    observability::init_logging(cli.verbose)?;

    let config = BackupConfig::load(cli.config.as_deref())?.with_token_override(cli.token.clone());
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run { metrics_file: None }) {
        Commands::Run { metrics_file } => run_backup(&config, metrics_file),
        Commands::Plan => plan_backup(&config),
        Commands::List => list_snapshots(&config),
    }
}

fn run_backup(
    config: &BackupConfig,
    metrics_file: Option<PathBuf>,
) -> Result<ExitCode, anyhow::Error> {
    if config.resources().is_empty() {
        info!("No droplet_ids or volume_ids configured, nothing to back up");
        return Ok(ExitCode::SUCCESS);
    }

    let runner = BackupRunner::new(create_digitalocean_provider(config)?);
    let report = runner.run(config)?;
    print_report(&report);

    if let Some(path) = metrics_file {
        write_metrics(&path)?;
    }

    Ok(exit_code(&report))
}

/// Exit status for a finished pass: failure if any resource had a failure
fn exit_code(report: &BackupReport) -> ExitCode {
    if report.has_failures() {
        error!(
            "{} of {} resource(s) had failures",
            report.failed(),
            report.outcomes.len()
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn print_report(report: &BackupReport) {
    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|outcome| OutcomeRow {
            resource: outcome.resource.to_string(),
            created: outcome.created.clone().unwrap_or_else(|| "-".to_string()),
            deleted: outcome.deleted.len(),
            transferred: outcome.transferred.len(),
            status: match (&outcome.error, outcome.failures.len()) {
                (Some(e), _) => format!("failed: {e}"),
                (None, 0) => "ok".to_string(),
                (None, n) => format!("{n} snapshot operation(s) failed"),
            },
        })
        .collect();

    println!("{}", Table::new(rows));
}

#[cfg(feature = "metrics")]
fn write_metrics(path: &std::path::Path) -> Result<(), anyhow::Error> {
    let text = observability::BackupMetrics::global().gather_metrics()?;
    std::fs::write(path, text)?;
    info!("Metrics written to {}", path.display());
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn write_metrics(_path: &std::path::Path) -> Result<(), anyhow::Error> {
    Err(anyhow::anyhow!("Metrics support not enabled"))
}

fn plan_backup(config: &BackupConfig) -> Result<ExitCode, anyhow::Error> {
    let runner = BackupRunner::new(create_digitalocean_provider(config)?);
    let plans = runner.plan(config)?;

    let mut rows = Vec::new();
    let mut failed = false;
    for resource_plan in &plans {
        failed |= resource_plan.error.is_some();
        rows.extend(plan_rows(resource_plan));
    }

    if rows.is_empty() {
        println!("Nothing to delete or transfer");
    } else {
        println!("{}", Table::new(rows));
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn plan_rows(resource_plan: &ResourcePlan) -> Vec<PlanRow> {
    let resource = resource_plan.resource.to_string();

    let Some(plan) = &resource_plan.plan else {
        let reason = resource_plan.error.clone().unwrap_or_default();
        return vec![PlanRow {
            resource,
            name: "-".to_string(),
            created: "-".to_string(),
            action: format!("error: {reason}"),
        }];
    };

    let deletions = plan.delete.iter().map(|s| (s, "delete".to_string()));
    let transfers = plan.transfer.iter().map(|s| (s, "transfer".to_string()));

    deletions
        .chain(transfers)
        .map(|(snapshot, action)| PlanRow {
            resource: resource.clone(),
            name: snapshot.name.clone(),
            created: format_timestamp(snapshot.created_at),
            action,
        })
        .collect()
}

fn list_snapshots(config: &BackupConfig) -> Result<ExitCode, anyhow::Error> {
    let runner = BackupRunner::new(create_digitalocean_provider(config)?);
    let pattern = SnapshotNamePattern::new(config.retention.prefix.clone());

    let mut rows = Vec::new();
    let mut failed = false;
    for resource_plan in runner.plan(config)? {
        if let Some(e) = &resource_plan.error {
            error!("Failed to list snapshots for {}: {}", resource_plan.resource, e);
            failed = true;
            continue;
        }
        for snapshot in &resource_plan.snapshots {
            rows.push(SnapshotRow {
                resource: resource_plan.resource.to_string(),
                id: snapshot.id.clone(),
                name: snapshot.name.clone(),
                created: format_timestamp(snapshot.created_at),
                regions: snapshot.regions.join(","),
                managed: if pattern.is_match(&snapshot.name) {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
            });
        }
    }

    if rows.is_empty() {
        println!("No snapshots found");
    } else {
        println!("{}", Table::new(rows));
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clap::CommandFactory;
    use ocean_backup_core::{ResourceOutcome, RetentionPlan, Resource, Snapshot};

    fn outcome(resource: Resource, error: Option<&str>) -> ResourceOutcome {
        ResourceOutcome {
            resource,
            created: Some("web-autobackup-240501083000".to_string()),
            deleted: vec!["1".to_string()],
            transferred: Vec::new(),
            failures: Vec::new(),
            error: error.map(str::to_string),
        }
    }

    fn report(outcomes: Vec<ResourceOutcome>) -> BackupReport {
        BackupReport {
            started_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            outcomes,
        }
    }

    #[test]
    fn test_exit_code_success_when_every_resource_succeeded() {
        assert_eq!(exit_code(&report(Vec::new())), ExitCode::SUCCESS);

        let report = report(vec![
            outcome(Resource::droplet("42"), None),
            outcome(Resource::volume("vol-9"), None),
        ]);
        assert_eq!(exit_code(&report), ExitCode::SUCCESS);
    }

    #[test]
    fn test_exit_code_failure_when_one_resource_failed() {
        let report = report(vec![
            outcome(Resource::droplet("42"), None),
            outcome(Resource::droplet("404"), Some("API error (404): not found")),
        ]);
        assert_eq!(exit_code(&report), ExitCode::FAILURE);
    }

    #[test]
    fn test_exit_code_failure_on_snapshot_operation_failures() {
        let mut partial = outcome(Resource::droplet("42"), None);
        partial.failures.push("delete 1: API error (500): Server Error".to_string());
        assert_eq!(exit_code(&report(vec![partial])), ExitCode::FAILURE);
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_the_default_command() {
        let cli = Cli::try_parse_from(["ocean-backup", "--config", "/tmp/ob.toml"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ob.toml")));

        let cli = Cli::try_parse_from(["ocean-backup", "run", "--metrics-file", "m.prom"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run { metrics_file: Some(_) })
        ));
    }

    #[test]
    fn test_plan_rows_list_deletions_then_transfers() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let old = Snapshot::new("1", "web-autobackup-240501083000", at);
        let kept = Snapshot::new("2", "web-autobackup-240502083000", at);

        let resource_plan = ResourcePlan {
            resource: Resource::droplet("42"),
            snapshots: vec![old.clone(), kept.clone()],
            plan: Some(RetentionPlan {
                matched: vec![old.clone(), kept.clone()],
                delete: vec![old],
                transfer: vec![kept],
                expiry: None,
            }),
            error: None,
        };

        let rows = plan_rows(&resource_plan);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, "delete");
        assert_eq!(rows[0].created, "2024-05-01 08:30:00 UTC");
        assert_eq!(rows[1].action, "transfer");
        assert_eq!(rows[1].resource, "Droplet ID(42)");
    }

    #[test]
    fn test_plan_rows_report_listing_errors() {
        let resource_plan = ResourcePlan {
            resource: Resource::volume("vol-9"),
            snapshots: Vec::new(),
            plan: None,
            error: Some("HTTP error: timed out".to_string()),
        };

        let rows = plan_rows(&resource_plan);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "error: HTTP error: timed out");
    }
}
