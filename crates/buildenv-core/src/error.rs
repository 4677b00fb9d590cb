//! Error types for buildenv invocations.

use thiserror::Error;

use crate::channel::{ChannelError, ShellRefusal};
use crate::config::ConfigError;
use crate::extension::ExtensionError;
use crate::sandbox::SandboxError;

/// Top-level error type; every variant maps to exit code 1 at the process boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sandbox creation, upgrade or bootstrap failed.
    #[error("sandbox setup failed")]
    Sandbox(#[from] SandboxError),

    /// An extension failed to load or initialize.
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// The command channel refused or could not serve the request.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<ShellRefusal> for Error {
    fn from(value: ShellRefusal) -> Self {
        Self::Channel(ChannelError::Refused(value))
    }
}

impl Error {
    /// True for refusals the user is expected to fix (not a crash).
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Channel(ChannelError::Refused(_)))
    }
}

/// Result type alias for buildenv operations.
pub type Result<T> = std::result::Result<T, Error>;
