use std::path::PathBuf;

use thiserror::Error;

use crate::types::Platform;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("no notification provider for platform {0}")]
    UnsupportedPlatform(Platform),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid configuration for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("configuration error: {0}")]
    Other(String),
}

/// Failures reported by a native notification backend.
#[derive(Clone, Debug, Error)]
pub enum NotifyError {
    #[error("notification service initialization failed: {0}")]
    Initialization(String),
    #[error("notification permission not granted")]
    PermissionDenied,
    #[error("native show call failed: {0}")]
    Show(String),
    #[error("invalid notification payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("resource does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no embedded resource named {0}")]
    UnknownResource(String),
    #[error("invalid resource locator {locator}: {message}")]
    InvalidLocator { locator: String, message: String },
    #[error("failed to stage resource at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Errors that reflect the running environment rather than caller input.
    pub const fn is_environmental(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPlatform(_)
                | Self::Notify(NotifyError::Initialization(_))
                | Self::Staging(StagingError::Io { .. })
        )
    }
}
