/*!
Snapshot and resource model as observed from the provider.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of resource a snapshot is taken of
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Compute instance
    Droplet,
    /// Block storage volume
    Volume,
}

impl ResourceKind {
    /// Whether snapshots of this kind can be copied to another region.
    ///
    /// Only droplet snapshots are images; volume snapshots are pinned to the
    /// volume's region.
    pub fn supports_transfer(self) -> bool {
        matches!(self, ResourceKind::Droplet)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Droplet => "Droplet",
            ResourceKind::Volume => "Volume",
        }
    }
}

/// A droplet or volume configured for backup
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: String,
}

impl Resource {
    pub fn droplet<S: Into<String>>(id: S) -> Self {
        Self {
            kind: ResourceKind::Droplet,
            id: id.into(),
        }
    }

    pub fn volume<S: Into<String>>(id: S) -> Self {
        Self {
            kind: ResourceKind::Volume,
            id: id.into(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ID({})", self.kind.label(), self.id)
    }
}

/// A point-in-time snapshot owned by the provider
///
/// Snapshots are read-only to this crate: they are listed, possibly deleted or
/// transferred, but never mutated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Provider identifier (numeric for droplet images, UUID for volumes)
    pub id: String,

    /// Human-readable snapshot name
    pub name: String,

    /// Creation time reported by the provider
    pub created_at: DateTime<Utc>,

    /// Regions currently holding a copy
    #[serde(default)]
    pub regions: Vec<String>,

    /// Billed size, when the provider reports it
    #[serde(default)]
    pub size_gigabytes: Option<f64>,
}

impl Snapshot {
    pub fn new<S1, S2>(id: S1, name: S2, created_at: DateTime<Utc>) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            created_at,
            regions: Vec::new(),
            size_gigabytes: None,
        }
    }

    /// Set the regions holding this snapshot
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Check whether a copy already exists in `region`
    pub fn is_in_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }
}
