//! Crate-root error type unioning every component's own error. Callers who don't care which
//! component failed can match one type; call sites that do care keep returning their own
//! component-specific `Result<T, XError>` alias.

use crate::{
    core::error::ContainerError,
    resource::ResourceError,
    tools::{GeneratorError, ToolClientError},
    ExecutionError,
};

/// The union of every component's error kind (C1-C6).
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("container controller (C1): {0}")]
    Container(#[from] ContainerError),
    #[error("execution client (C2): {0}")]
    Execution(#[from] ExecutionError),
    #[error("resource client/server (C3/C4): {0}")]
    Resource(#[from] ResourceError),
    #[error("tool-client generator (C5): {0}")]
    Generator(#[from] GeneratorError),
    #[error("tool-client runtime (C6): {0}")]
    ToolClient(#[from] ToolClientError),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
