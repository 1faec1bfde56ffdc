/// Errors raised by the tool-client runtime (C6): opening a transport, enumerating tools, or
/// invoking one.
#[derive(Debug, thiserror::Error)]
pub enum ToolClientError {
    #[error("failed to start tool server subprocess: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("tool server transport failed: {0}")]
    Transport(String),
    #[error("malformed tool server protocol frame: {0}")]
    Protocol(String),
    #[error("tool server reported failure for '{tool}': {message}")]
    ToolFailed { tool: String, message: String },
    #[error("no such tool: '{0}'")]
    UnknownTool(String),
    #[error("tool call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Errors raised while generating tool stubs (C5).
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error(transparent)]
    ToolClient(#[from] ToolClientError),
    #[error("I/O error writing generated stubs: {0}")]
    Io(#[from] std::io::Error),
    #[error("tool '{tool}' has a schema this generator cannot translate: {reason}")]
    InvalidSchema { tool: String, reason: String },
}
