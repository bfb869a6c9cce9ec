/*!
# OceanBackup Core

Snapshot rotation for DigitalOcean droplets and volumes.

Each backup pass creates one snapshot per configured resource, then prunes
managed snapshots older than the retention window while keeping a minimum
number of backups, and optionally copies retained droplet snapshots to a
second region.

## Architecture

- [`naming`] owns the `{prefix}-autobackup-{YYMMDDHHMMSS}` convention;
  snapshots that do not follow it are never touched
- [`retention`] is a pure policy evaluator producing a [`RetentionPlan`]
- [`provider`] defines the [`SnapshotProvider`] port and the DigitalOcean adapter
- [`backup`] runs the pass resource by resource and collects a [`BackupReport`]

## Usage

```rust,no_run
use ocean_backup_core::{create_digitalocean_provider, BackupConfig, BackupRunner};

let config = BackupConfig::load(None)?;
let runner = BackupRunner::new(create_digitalocean_provider(&config)?);

let report = runner.run(&config)?;
if report.has_failures() {
    eprintln!("{} resource(s) failed", report.failed());
}
# Ok::<(), ocean_backup_core::BackupError>(())
```
*/

pub mod backup;
pub mod config;
pub mod error;
pub mod naming;
pub mod observability;
pub mod provider;
pub mod retention;
#[cfg(test)]
mod retention_tests;
pub mod snapshot;

pub use backup::{BackupReport, BackupRunner, ResourceOutcome, ResourcePlan};
pub use config::{BackupConfig, DeletionOrder, RetentionConfig};
pub use error::{BackupError, Result};
pub use naming::{snapshot_name, SnapshotNamePattern};
#[cfg(feature = "digitalocean")]
pub use provider::{create_digitalocean_provider, DigitalOceanProvider};
pub use provider::SnapshotProvider;
pub use retention::{RetentionPlan, RetentionPolicy};
pub use snapshot::{Resource, ResourceKind, Snapshot};
