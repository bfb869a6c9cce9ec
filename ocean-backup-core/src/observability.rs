/*!
Observability for backup passes.

- Log setup: timestamped text lines, INFO and below on stdout, WARN and ERROR
  on stderr, filtered through `RUST_LOG` when set.
- Prometheus counters for created, deleted and transferred snapshots and for
  provider errors (behind the `metrics` feature).
*/

#[cfg(feature = "metrics")]
use prometheus::{IntCounter, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::writer::{MakeWriter, MakeWriterExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::{BackupError, Result};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<BackupMetrics> = OnceLock::new();

/// Counters for one process lifetime
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct BackupMetrics {
    pub snapshots_created_total: IntCounter,
    pub snapshots_deleted_total: IntCounter,
    pub snapshots_transferred_total: IntCounter,
    pub provider_errors_total: IntCounter,
    pub resource_failures_total: IntCounter,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl BackupMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter> {
            let counter = IntCounter::new(name, help).map_err(|e| {
                BackupError::observability(format!("Failed to create {name} metric: {e}"))
            })?;
            registry.register(Box::new(counter.clone())).map_err(|e| {
                BackupError::observability(format!("Failed to register {name}: {e}"))
            })?;
            Ok(counter)
        };

        let snapshots_created_total = counter(
            "ocean_backup_snapshots_created_total",
            "Snapshots requested by OceanBackup",
        )?;
        let snapshots_deleted_total = counter(
            "ocean_backup_snapshots_deleted_total",
            "Expired snapshots deleted by OceanBackup",
        )?;
        let snapshots_transferred_total = counter(
            "ocean_backup_snapshots_transferred_total",
            "Snapshot region transfers requested by OceanBackup",
        )?;
        let provider_errors_total = counter(
            "ocean_backup_provider_errors_total",
            "Failed provider API calls",
        )?;
        let resource_failures_total = counter(
            "ocean_backup_resource_failures_total",
            "Resources whose backup pass was aborted",
        )?;

        Ok(Self {
            snapshots_created_total,
            snapshots_deleted_total,
            snapshots_transferred_total,
            provider_errors_total,
            resource_failures_total,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static BackupMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize OceanBackup metrics"))
    }

    pub fn record_created(&self) {
        self.snapshots_created_total.inc();
    }

    pub fn record_deleted(&self) {
        self.snapshots_deleted_total.inc();
    }

    pub fn record_transferred(&self) {
        self.snapshots_transferred_total.inc();
    }

    pub fn record_provider_error(&self) {
        self.provider_errors_total.inc();
    }

    pub fn record_resource_failure(&self) {
        self.resource_failures_total.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| BackupError::observability(format!("Failed to encode metrics: {e}")))
    }
}

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Build the log subscriber writing to `stdout` and `stderr`
///
/// Each line starts with an RFC 3339 timestamp and the level. Events at WARN
/// or ERROR go to `stderr`, everything else to `stdout`.
pub fn log_subscriber<O, E>(
    filter: EnvFilter,
    stdout: O,
    stderr: E,
) -> impl Subscriber + Send + Sync + 'static
where
    O: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    E: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(stderr.with_max_level(Level::WARN).or_else(stdout))
        .with_target(false)
        .with_ansi(false)
        .finish()
}

/// Install the global log subscriber on the process stdout and stderr
pub fn init_logging(verbose: bool) -> Result<()> {
    log_subscriber(default_filter(verbose), std::io::stdout, std::io::stderr)
        .try_init()
        .map_err(|e| {
            BackupError::observability(format!("Failed to set global tracing subscriber: {e}"))
        })?;

    #[cfg(feature = "metrics")]
    BackupMetrics::global();

    Ok(())
}
