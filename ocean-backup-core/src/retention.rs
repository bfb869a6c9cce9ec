/*!
Retention policy evaluation.

Decides, for one resource, which managed snapshots to delete and which to copy
to the transfer region. Evaluation is pure: it only reads the snapshot list and
the policy and returns a [`RetentionPlan`]; the backup runner carries the plan
out against the provider.

Rules, applied to snapshots in the order the provider returned them:

1. `retention_days <= 0` keeps everything.
2. Only names matching `{prefix}-autobackup-{12 digits}` are considered.
3. At most `matched - min_backups` snapshots are deleted.
4. A snapshot is deleted only if it was created at or before
   `now - retention_days`. Newer snapshots are skipped without counting
   against the budget, so fewer than the budget may be deleted.
*/

use chrono::{DateTime, Duration, Utc};

use crate::config::{DeletionOrder, RetentionConfig};
use crate::naming::SnapshotNamePattern;
use crate::Snapshot;

const SECONDS_PER_DAY: i64 = 86_400;

/// Outcome of evaluating the policy against one resource's snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPlan {
    /// Managed snapshots, in evaluation order
    pub matched: Vec<Snapshot>,
    /// Snapshots to delete, in deletion order
    pub delete: Vec<Snapshot>,
    /// Retained managed snapshots missing from the transfer region
    pub transfer: Vec<Snapshot>,
    /// Cutoff used for this evaluation; `None` when retaining forever
    pub expiry: Option<DateTime<Utc>>,
}

impl RetentionPlan {
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty() && self.transfer.is_empty()
    }

    /// Number of managed snapshots left after deletions
    pub fn retained_count(&self) -> usize {
        self.matched.len() - self.delete.len()
    }
}

/// Applies a [`RetentionConfig`] to snapshot lists
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    config: RetentionConfig,
    pattern: SnapshotNamePattern,
}

impl RetentionPolicy {
    pub fn new(config: RetentionConfig) -> Self {
        let pattern = SnapshotNamePattern::new(config.prefix.clone());
        Self { config, pattern }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn pattern(&self) -> &SnapshotNamePattern {
        &self.pattern
    }

    /// Cutoff time: snapshots created at or before it are expired
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.config.retains_forever() {
            return None;
        }
        let window = self.config.retention_days.checked_mul(SECONDS_PER_DAY)?;
        now.checked_sub_signed(Duration::try_seconds(window)?)
    }

    /// Managed snapshots in the order the policy walks them
    pub fn matched(&self, snapshots: &[Snapshot]) -> Vec<Snapshot> {
        let mut matched: Vec<Snapshot> =
            self.pattern.filter(snapshots).into_iter().cloned().collect();
        if self.config.deletion_order == DeletionOrder::OldestFirst {
            // Stable, so equal timestamps keep provider order.
            matched.sort_by_key(|s| s.created_at);
        }
        matched
    }

    /// Snapshots to delete
    pub fn select_deletions(&self, snapshots: &[Snapshot], now: DateTime<Utc>) -> Vec<Snapshot> {
        let matched = self.matched(snapshots);
        self.deletions_from(&matched, now)
    }

    fn deletions_from(&self, matched: &[Snapshot], now: DateTime<Utc>) -> Vec<Snapshot> {
        let Some(expiry) = self.expiry(now) else {
            return Vec::new();
        };

        let mut deletable = matched.len() as i64 - self.config.min_backups;
        let mut selected = Vec::new();
        for snapshot in matched {
            if deletable <= 0 {
                break;
            }
            if snapshot.created_at > expiry {
                continue;
            }
            selected.push(snapshot.clone());
            deletable -= 1;
        }
        selected
    }

    /// Retained managed snapshots that still need a copy in the transfer region
    fn transfers_from(&self, matched: &[Snapshot], deleted: &[Snapshot]) -> Vec<Snapshot> {
        let Some(region) = self.config.transfer_region() else {
            return Vec::new();
        };

        matched
            .iter()
            .filter(|s| !s.is_in_region(region))
            .filter(|s| !deleted.iter().any(|d| d.id == s.id))
            .cloned()
            .collect()
    }

    /// Evaluate the full policy for one resource
    pub fn evaluate(&self, snapshots: &[Snapshot], now: DateTime<Utc>) -> RetentionPlan {
        let matched = self.matched(snapshots);
        let delete = self.deletions_from(&matched, now);
        let transfer = self.transfers_from(&matched, &delete);

        RetentionPlan {
            expiry: self.expiry(now),
            matched,
            delete,
            transfer,
        }
    }
}
