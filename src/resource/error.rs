/// Errors raised while performing a resource operation (file/archive transfer, module source
/// retrieval, tool-stub generation) against a container's resource service.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource service transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("resource '{path}' was not found")]
    NotFound { path: String },
    #[error("module '{module}' has no pure-Python source available")]
    NotPurePython { module: String },
    #[error("invalid resource path: {0}")]
    InvalidPath(String),
    #[error("resource service returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("archive entry escapes the extraction root: {0}")]
    UnsafeArchive(String),
    #[error("tool-stub generation failed: {0}")]
    Generator(#[from] crate::tools::GeneratorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResourceError {
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, ResourceError::Transport(_))
            || matches!(self, ResourceError::Server { status, .. } if *status >= 500)
    }
}
