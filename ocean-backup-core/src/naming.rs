/*!
Snapshot naming convention.

A managed backup is named `{prefix}-autobackup-{YYMMDDHHMMSS}`. Only snapshots
whose name matches this pattern exactly are considered by the retention policy
and region transfer; everything else on the resource is left alone.
*/

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::Snapshot;

/// Marker between the user prefix and the timestamp
pub const AUTOBACKUP_MARKER: &str = "-autobackup-";

/// `chrono` format for the trailing timestamp (12 digits)
pub const TIMESTAMP_FORMAT: &str = "%y%m%d%H%M%S";

/// Build the canonical snapshot name for a backup taken at `at`
///
/// # Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use ocean_backup_core::naming::snapshot_name;
///
/// let at = Utc.with_ymd_and_hms(2018, 12, 25, 23, 59, 0).unwrap();
/// assert_eq!(snapshot_name("foobar", at), "foobar-autobackup-181225235900");
/// ```
pub fn snapshot_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}{AUTOBACKUP_MARKER}{}", at.format(TIMESTAMP_FORMAT))
}

/// Compiled matcher for managed snapshot names of one prefix
#[derive(Debug, Clone)]
pub struct SnapshotNamePattern {
    prefix: String,
    regex: Regex,
}

impl SnapshotNamePattern {
    /// Compile the pattern for `prefix`
    ///
    /// The prefix is matched literally, so characters such as `.` or `+` in a
    /// prefix do not widen the match.
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        let prefix = prefix.into();
        let pattern = format!(
            "^{}{}[0-9]{{12}}$",
            regex::escape(&prefix),
            regex::escape(AUTOBACKUP_MARKER)
        );
        let regex = Regex::new(&pattern).expect("escaped snapshot name pattern is valid");
        Self { prefix, regex }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Check whether `name` is a managed backup name
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Keep only managed snapshots, preserving input order
    pub fn filter<'a>(&self, snapshots: &'a [Snapshot]) -> Vec<&'a Snapshot> {
        snapshots.iter().filter(|s| self.is_match(&s.name)).collect()
    }

    /// Build a name for a backup taken at `at` that this pattern accepts
    pub fn name_at(&self, at: DateTime<Utc>) -> String {
        snapshot_name(&self.prefix, at)
    }
}
