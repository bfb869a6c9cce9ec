/*!
Error types for the OceanBackup core.
*/

use thiserror::Error;

/// Result type used throughout the OceanBackup core.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can occur while configuring or running a backup pass.
#[derive(Error, Debug)]
pub enum BackupError {
    /// I/O errors while reading configuration files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No API token was configured
    #[error("Missing API token: set `token` in the config file or OCEAN_BACKUP_TOKEN")]
    MissingToken,

    /// Transport-level failure talking to the provider
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Logging or metrics setup failed
    #[error("Observability error: {0}")]
    Observability(String),
}

impl BackupError {
    /// Create a new HTTP error
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new observability error
    pub fn observability<S: Into<String>>(msg: S) -> Self {
        Self::Observability(msg.into())
    }
}
