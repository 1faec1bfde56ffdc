use std::error::Error;

pub use crate::core::{client::ClientError, env::ConfigurationError};

pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors raised while provisioning or operating a sandbox container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Represents an error that occurred in the client of Docker API.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Represents an error when a container does not expose a specified port.
    #[error("container '{id}' does not expose port {port}")]
    PortNotExposed { id: String, port: u16 },
    /// Represents an error when a container is missing some information.
    #[error(transparent)]
    MissingInfo(#[from] ContainerMissingInfo),
    /// Represents an error when an exec operation fails.
    #[error("exec operation failed: {0}")]
    Exec(#[from] ExecError),
    /// The container never became reachable on its executor/resource ports within the
    /// configured liveness probe budget.
    #[error("container '{id}' did not become ready within {elapsed_ms}ms")]
    LivenessTimeout { id: String, elapsed_ms: u64 },
    /// The requested operation is not meaningful for the container's current privilege mode,
    /// e.g. installing a firewall in a container running as root.
    #[error("unsupported mode for container '{id}': {reason}")]
    UnsupportedMode { id: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Represents any other error that does not fit into the above categories.
    #[error("other error: {0}")]
    Other(Box<dyn Error + Sync + Send>),
}

#[derive(Debug, thiserror::Error)]
#[error("container '{id}' does not have: {path}")]
pub struct ContainerMissingInfo {
    /// Container ID
    id: String,
    /// Path to the missing information (e.g `NetworkSettings.Networks`).
    path: String,
}

/// Error type for exec operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("exec process exited with code {actual}, expected {expected}: {stderr}")]
    ExitCodeMismatch {
        expected: i64,
        actual: i64,
        stderr: String,
    },
}

impl ContainerError {
    /// Creates a new `ContainerError` from an arbitrary error payload.
    ///
    /// It's preferable to use the more specific error constructors if possible.
    /// But this method is useful when you need to:
    /// - wrap an error that doesn't fit into the other categories
    /// - avoid introducing a new kind of error in order to keep the error handling simple
    /// - create a custom error from client code.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }
}

impl ContainerMissingInfo {
    pub(crate) fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}
