/*!
Backup runner that carries out a backup pass over every configured resource.

For each droplet, then each volume: create a snapshot, list the resource's
snapshots, evaluate the retention policy, delete what it selects and request
region transfers. A failure on one resource is logged and recorded in the
[`BackupReport`]; the pass always moves on to the next resource.
*/

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::BackupConfig;
use crate::provider::SnapshotProvider;
use crate::retention::{RetentionPlan, RetentionPolicy};
use crate::{Resource, ResourceKind, Result, Snapshot};

/// What happened to one resource during a backup pass
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOutcome {
    pub resource: Resource,
    /// Name of the snapshot requested in this pass
    pub created: Option<String>,
    /// IDs of snapshots deleted
    pub deleted: Vec<String>,
    /// IDs of snapshots sent to the transfer region
    pub transferred: Vec<String>,
    /// Per-snapshot failures that did not stop the resource
    pub failures: Vec<String>,
    /// Error that stopped processing this resource
    pub error: Option<String>,
}

impl ResourceOutcome {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            created: None,
            deleted: Vec::new(),
            transferred: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failures.is_empty()
    }
}

/// Aggregate result of a backup pass
#[derive(Debug, Clone, PartialEq)]
pub struct BackupReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ResourceOutcome>,
}

impl BackupReport {
    /// Resources processed without any failure
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Resources with at least one failure
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn deleted_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.deleted.len()).sum()
    }

    pub fn transferred_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.transferred.len()).sum()
    }
}

/// Dry-run view of one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePlan {
    pub resource: Resource,
    /// Every snapshot the provider returned, managed or not
    pub snapshots: Vec<Snapshot>,
    pub plan: Option<RetentionPlan>,
    pub error: Option<String>,
}

/// Runs backup passes against a [`SnapshotProvider`]
///
/// # Example
/// ```rust,no_run
/// use ocean_backup_core::{BackupConfig, BackupRunner, create_digitalocean_provider};
///
/// let config = BackupConfig::load(None)?;
/// let runner = BackupRunner::new(create_digitalocean_provider(&config)?);
/// let report = runner.run(&config)?;
/// println!("{} deleted", report.deleted_count());
/// # Ok::<(), ocean_backup_core::BackupError>(())
/// ```
pub struct BackupRunner<P: SnapshotProvider> {
    provider: P,
}

impl<P: SnapshotProvider> BackupRunner<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run a full backup pass now
    pub fn run(&self, config: &BackupConfig) -> Result<BackupReport> {
        self.run_at(config, Utc::now())
    }

    /// Run a full backup pass as of `now`
    ///
    /// # Errors
    /// Only an invalid configuration is an error; provider failures are
    /// reported per resource in the returned [`BackupReport`].
    pub fn run_at(&self, config: &BackupConfig, now: DateTime<Utc>) -> Result<BackupReport> {
        config.validate()?;
        let policy = RetentionPolicy::new(config.retention.clone());
        let mut outcomes = Vec::new();

        for kind in [ResourceKind::Droplet, ResourceKind::Volume] {
            info!("Processing {} snapshots...", kind.label());
            for resource in config.resources().into_iter().filter(|r| r.kind == kind) {
                outcomes.push(self.backup_resource(resource, &policy, now));
            }
        }

        info!("Backup process completed.");
        Ok(BackupReport {
            started_at: now,
            outcomes,
        })
    }

    fn backup_resource(
        &self,
        resource: Resource,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> ResourceOutcome {
        let mut outcome = ResourceOutcome::new(resource);
        if let Err(e) = self.try_backup_resource(policy, now, &mut outcome) {
            warn!("Unable to process {}: {}", outcome.resource, e);
            #[cfg(feature = "metrics")]
            crate::observability::BackupMetrics::global().record_resource_failure();
            outcome.error = Some(e.to_string());
        }
        outcome
    }

    fn try_backup_resource(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
        outcome: &mut ResourceOutcome,
    ) -> Result<()> {
        let resource = outcome.resource.clone();
        let name = policy.pattern().name_at(now);

        self.provider
            .create_snapshot(&resource, &name)
            .inspect_err(|e| error!("Failed to create snapshot for {resource}: {e}"))?;
        info!("{} snapshot '{name}' created.", resource.kind.label());
        #[cfg(feature = "metrics")]
        crate::observability::BackupMetrics::global().record_created();
        outcome.created = Some(name);

        let snapshots = self.provider.list_snapshots(&resource)?;
        let plan = policy.evaluate(&snapshots, now);
        debug!(
            resource = %resource,
            listed = snapshots.len(),
            matched = plan.matched.len(),
            delete = plan.delete.len(),
            transfer = plan.transfer.len(),
            "Evaluated retention policy"
        );

        self.delete_expired(&plan, outcome);
        if let Some(region) = policy.config().transfer_region() {
            self.transfer_retained(&plan, region, outcome);
        }
        Ok(())
    }

    fn delete_expired(&self, plan: &RetentionPlan, outcome: &mut ResourceOutcome) {
        for snapshot in &plan.delete {
            info!("Deleting {}({})", outcome.resource.kind.label(), snapshot.name);
            match self.provider.delete_snapshot(&snapshot.id) {
                Ok(()) => {
                    #[cfg(feature = "metrics")]
                    crate::observability::BackupMetrics::global().record_deleted();
                    outcome.deleted.push(snapshot.id.clone());
                }
                Err(e) => {
                    warn!("Failed to delete snapshot '{}' ({}): {}", snapshot.name, snapshot.id, e);
                    outcome
                        .failures
                        .push(format!("delete {}: {e}", snapshot.id));
                }
            }
        }
    }

    fn transfer_retained(&self, plan: &RetentionPlan, region: &str, outcome: &mut ResourceOutcome) {
        if plan.transfer.is_empty() {
            return;
        }
        if !outcome.resource.kind.supports_transfer() {
            debug!(
                resource = %outcome.resource,
                "Skipping region transfer, snapshots of this resource kind cannot be transferred"
            );
            return;
        }

        for snapshot in &plan.transfer {
            info!("Transferring snapshot '{}' to {region}", snapshot.name);
            match self.provider.transfer_snapshot(&snapshot.id, region) {
                Ok(()) => {
                    #[cfg(feature = "metrics")]
                    crate::observability::BackupMetrics::global().record_transferred();
                    outcome.transferred.push(snapshot.id.clone());
                }
                Err(e) => {
                    warn!(
                        "Failed to transfer snapshot '{}' ({}) to {region}: {e}",
                        snapshot.name, snapshot.id
                    );
                    outcome
                        .failures
                        .push(format!("transfer {}: {e}", snapshot.id));
                }
            }
        }
    }

    /// Evaluate the policy for every resource without changing anything
    pub fn plan(&self, config: &BackupConfig) -> Result<Vec<ResourcePlan>> {
        self.plan_at(config, Utc::now())
    }

    /// Dry run as of `now`: lists snapshots and evaluates the policy only
    pub fn plan_at(&self, config: &BackupConfig, now: DateTime<Utc>) -> Result<Vec<ResourcePlan>> {
        config.validate()?;
        let policy = RetentionPolicy::new(config.retention.clone());

        Ok(config
            .resources()
            .into_iter()
            .map(|resource| match self.provider.list_snapshots(&resource) {
                Ok(snapshots) => {
                    let mut plan = policy.evaluate(&snapshots, now);
                    if !resource.kind.supports_transfer() {
                        plan.transfer.clear();
                    }
                    ResourcePlan {
                        resource,
                        snapshots,
                        plan: Some(plan),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Unable to list snapshots for {resource}: {e}");
                    ResourcePlan {
                        resource,
                        snapshots: Vec::new(),
                        plan: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect())
    }
}
