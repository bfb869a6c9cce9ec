//! Configuration for a backup pass
//!
//! Settings are read from a TOML file holding the API token, the droplets and
//! volumes to back up, and the retention policy. Without an explicit path the
//! loader tries `~/ocean_backup.toml`, then `/etc/ocean_backup.toml`, and
//! falls back to defaults when neither is usable.
//!
//! ```toml
//! token = "dop_v1_..."
//! prefix = "web"
//! droplet_ids = [123456, 234567]
//! volume_ids = ["506f78a4-e098-11e5-ad9f-000f53306ae1"]
//! retention_days = 7
//! min_backups = 3
//! transfer_region = "sfo3"
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{BackupError, Resource, Result};

/// File name looked up in the home directory and `/etc`
pub const CONFIG_FILE_NAME: &str = "ocean_backup.toml";

/// Default DigitalOcean API endpoint
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

pub const DEFAULT_PREFIX: &str = "oceanbackup";
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_MIN_BACKUPS: i64 = 3;

/// Order in which expired snapshots are considered for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionOrder {
    /// Walk snapshots in the order the provider returned them
    #[default]
    ProviderOrder,
    /// Sort by creation time, oldest first
    OldestFirst,
}

/// Retention policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// User prefix; snapshot names are `{prefix}-autobackup-{YYMMDDHHMMSS}`
    pub prefix: String,
    /// Days a backup is always kept; zero or negative keeps backups forever
    pub retention_days: i64,
    /// Minimum number of managed backups left on a resource
    pub min_backups: i64,
    /// Region every retained droplet snapshot should also be present in
    pub transfer_region: Option<String>,
    pub deletion_order: DeletionOrder,
}

impl RetentionConfig {
    /// The transfer region, treating an empty value as unset
    pub fn transfer_region(&self) -> Option<&str> {
        self.transfer_region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Whether expired backups are ever deleted
    pub fn retains_forever(&self) -> bool {
        self.retention_days <= 0
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            prefix: DEFAULT_PREFIX.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            min_backups: DEFAULT_MIN_BACKUPS,
            transfer_region: None,
            deletion_order: DeletionOrder::default(),
        }
    }
}

/// Complete configuration for one backup pass
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// DigitalOcean API token
    pub token: Option<String>,
    /// Base URL of the provider API
    pub api_url: String,
    #[serde(deserialize_with = "deserialize_ids")]
    pub droplet_ids: Vec<String>,
    #[serde(deserialize_with = "deserialize_ids")]
    pub volume_ids: Vec<String>,
    #[serde(flatten)]
    pub retention: RetentionConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            droplet_ids: Vec::new(),
            volume_ids: Vec::new(),
            retention: RetentionConfig::default(),
        }
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("droplet_ids", &self.droplet_ids)
            .field("volume_ids", &self.volume_ids)
            .field("retention", &self.retention)
            .finish()
    }
}

impl BackupConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from `path`, or from the default locations
    ///
    /// An explicit path must exist and parse. Without one, the first readable
    /// and parseable file in [`default_search_paths`] wins; if none is found a
    /// warning is logged and defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading config file");
            return Self::from_file(path);
        }

        Self::load_first(&default_search_paths())
    }

    /// Load the first usable config among `candidates`
    pub fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        for candidate in candidates {
            if !candidate.is_file() {
                continue;
            }
            match Self::from_file(candidate) {
                Ok(config) => {
                    debug!(path = %candidate.display(), "Loaded config file");
                    return Ok(config);
                }
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "Skipping unusable config file");
                }
            }
        }

        warn!("Config file not found.");
        Ok(Self::default())
    }

    /// Replace the file's token with one supplied on the command line or environment
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = Some(token);
        }
        self
    }

    /// The API token, or [`BackupError::MissingToken`]
    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(BackupError::MissingToken)
    }

    /// All configured resources, droplets first
    pub fn resources(&self) -> Vec<Resource> {
        self.droplet_ids
            .iter()
            .map(Resource::droplet)
            .chain(self.volume_ids.iter().map(Resource::volume))
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.retention.prefix.trim().is_empty() {
            return Err(BackupError::validation("prefix cannot be empty"));
        }
        if self.retention.min_backups < 0 {
            return Err(BackupError::validation(format!(
                "min_backups must not be negative (got {})",
                self.retention.min_backups
            )));
        }
        if self.api_url.trim().is_empty() {
            return Err(BackupError::validation("api_url cannot be empty"));
        }
        Ok(())
    }
}

/// Default config locations, in lookup order
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));
    paths
}

/// Droplet IDs are numbers and volume IDs are UUIDs; accept either spelling.
fn deserialize_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(u64),
        Str(String),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Int(n) => n.to_string(),
            Id::Str(s) => s,
        })
        .collect())
}
