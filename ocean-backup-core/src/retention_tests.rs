/*!
Tests for retention policy evaluation.
*/

#[cfg(test)]
mod tests {
    use crate::config::{DeletionOrder, RetentionConfig};
    use crate::naming::snapshot_name;
    use crate::retention::RetentionPolicy;
    use crate::Snapshot;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn policy(retention_days: i64, min_backups: i64) -> RetentionPolicy {
        RetentionPolicy::new(RetentionConfig {
            prefix: "web".to_string(),
            retention_days,
            min_backups,
            ..RetentionConfig::default()
        })
    }

    /// A managed snapshot created `age` before [`now`]
    fn managed(id: &str, age: Duration) -> Snapshot {
        let created = now() - age;
        Snapshot::new(id, snapshot_name("web", created), created).with_regions(["nyc3"])
    }

    fn ids(snapshots: &[Snapshot]) -> Vec<&str> {
        snapshots.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_ages_10_8_2_with_min_one_deletes_both_expired() {
        let snapshots = vec![
            managed("a", Duration::days(10)),
            managed("b", Duration::days(8)),
            managed("c", Duration::days(2)),
        ];

        let deleted = policy(7, 1).select_deletions(&snapshots, now());
        assert_eq!(ids(&deleted), vec!["a", "b"]);
    }

    #[test]
    fn test_retention_zero_never_deletes() {
        let snapshots: Vec<Snapshot> = (0..10)
            .map(|i| managed(&i.to_string(), Duration::days(365 + i)))
            .collect();

        assert!(policy(0, 0).select_deletions(&snapshots, now()).is_empty());
        assert!(policy(-3, 0).select_deletions(&snapshots, now()).is_empty());
        assert!(policy(0, 0).expiry(now()).is_none());
    }

    #[test]
    fn test_matched_count_at_or_below_min_never_deletes() {
        let snapshots = vec![
            managed("a", Duration::days(30)),
            managed("b", Duration::days(20)),
            managed("c", Duration::days(10)),
        ];

        assert!(policy(7, 3).select_deletions(&snapshots, now()).is_empty());
        assert!(policy(7, 5).select_deletions(&snapshots, now()).is_empty());
        assert_eq!(policy(7, 2).select_deletions(&snapshots, now()).len(), 1);
    }

    #[test]
    fn test_deletion_count_capped_by_min_backups() {
        let snapshots = vec![
            managed("a", Duration::days(30)),
            managed("b", Duration::days(20)),
            managed("c", Duration::days(10)),
            managed("d", Duration::days(9)),
        ];

        let deleted = policy(7, 2).select_deletions(&snapshots, now());
        assert_eq!(ids(&deleted), vec!["a", "b"]);
    }

    #[test]
    fn test_recent_snapshots_do_not_consume_budget() {
        let snapshots = vec![
            managed("new1", Duration::days(1)),
            managed("old1", Duration::days(12)),
            managed("new2", Duration::days(2)),
            managed("old2", Duration::days(15)),
        ];

        // Budget is 4 - 1 = 3 but only two snapshots have expired.
        let deleted = policy(7, 1).select_deletions(&snapshots, now());
        assert_eq!(ids(&deleted), vec!["old1", "old2"]);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let snapshots = vec![
            managed("exact", Duration::days(7)),
            managed("just-inside", Duration::days(7) - Duration::seconds(1)),
        ];

        let deleted = policy(7, 0).select_deletions(&snapshots, now());
        assert_eq!(ids(&deleted), vec!["exact"]);
    }

    #[test]
    fn test_unmatched_snapshots_are_never_deleted_or_counted() {
        let ancient = now() - Duration::days(400);
        let snapshots = vec![
            Snapshot::new("manual", "before-upgrade", ancient),
            Snapshot::new("other", snapshot_name("db", ancient), ancient),
            managed("a", Duration::days(10)),
            managed("b", Duration::days(1)),
        ];

        let plan = policy(7, 1).evaluate(&snapshots, now());
        assert_eq!(ids(&plan.matched), vec!["a", "b"]);
        assert_eq!(ids(&plan.delete), vec!["a"]);
        assert_eq!(plan.retained_count(), 1);
    }

    #[test]
    fn test_provider_order_is_preserved_by_default() {
        // Newest expired snapshot is listed first, so it goes first.
        let snapshots = vec![
            managed("mid", Duration::days(9)),
            managed("oldest", Duration::days(20)),
            managed("recent", Duration::days(1)),
        ];

        let deleted = policy(7, 2).select_deletions(&snapshots, now());
        assert_eq!(ids(&deleted), vec!["mid"]);
    }

    #[test]
    fn test_oldest_first_sorts_before_selecting() {
        let snapshots = vec![
            managed("mid", Duration::days(9)),
            managed("oldest", Duration::days(20)),
            managed("recent", Duration::days(1)),
        ];

        let policy = RetentionPolicy::new(RetentionConfig {
            prefix: "web".to_string(),
            retention_days: 7,
            min_backups: 2,
            deletion_order: DeletionOrder::OldestFirst,
            ..RetentionConfig::default()
        });

        let deleted = policy.select_deletions(&snapshots, now());
        assert_eq!(ids(&deleted), vec!["oldest"]);
    }

    #[test]
    fn test_transfer_skips_snapshots_already_in_region() {
        let snapshots = vec![
            managed("here", Duration::days(1)).with_regions(["nyc3", "sfo3"]),
            managed("missing", Duration::days(2)),
        ];

        let policy = RetentionPolicy::new(RetentionConfig {
            prefix: "web".to_string(),
            transfer_region: Some("sfo3".to_string()),
            ..RetentionConfig::default()
        });

        let plan = policy.evaluate(&snapshots, now());
        assert_eq!(ids(&plan.transfer), vec!["missing"]);
    }

    #[test]
    fn test_transfer_excludes_unmatched_and_deleted() {
        let ancient = now() - Duration::days(90);
        let snapshots = vec![
            Snapshot::new("manual", "hand-made", ancient),
            managed("expired", Duration::days(30)),
            managed("kept", Duration::days(1)),
        ];

        let policy = RetentionPolicy::new(RetentionConfig {
            prefix: "web".to_string(),
            retention_days: 7,
            min_backups: 1,
            transfer_region: Some("ams3".to_string()),
            ..RetentionConfig::default()
        });

        let plan = policy.evaluate(&snapshots, now());
        assert_eq!(ids(&plan.delete), vec!["expired"]);
        assert_eq!(ids(&plan.transfer), vec!["kept"]);
    }

    #[test]
    fn test_no_transfer_region_means_no_transfers() {
        let snapshots = vec![managed("a", Duration::days(1))];
        let plan = policy(7, 3).evaluate(&snapshots, now());

        assert!(plan.transfer.is_empty());
        assert!(plan.is_noop());
    }

    #[test]
    fn test_huge_retention_window_keeps_everything() {
        let snapshots = vec![managed("a", Duration::days(3650))];
        let deleted = policy(i64::MAX, 0).select_deletions(&snapshots, now());
        assert!(deleted.is_empty());
    }
}
