//! CLI error types and conversions

use crate::controller::SyncError;
use crate::dataset::RegistryError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Registry or config error
    #[error("configuration error: {0}")]
    Registry(#[from] RegistryError),

    /// Sync run error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Remote client error
    #[error("remote error: {0}")]
    Remote(#[from] crate::remote::SourceError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Usage and configuration problems exit 2 so wrappers can tell a bad
    /// invocation apart from a run that genuinely failed (1).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Registry(_) | CliError::InvalidArgument(_) => 2,
            CliError::Sync(SyncError::Registry(_)) | CliError::Sync(SyncError::Window(_)) => 2,
            _ => 1,
        }
    }
}
