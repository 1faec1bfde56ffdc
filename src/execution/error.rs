/// Errors raised while driving a kernel execution session.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to talk to kernel gateway: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("kernel channel transport failed: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed kernel message: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("kernel channel connection was lost")]
    ConnectionLost,
    #[error("execution '{execution_id}' timed out after {elapsed_ms}ms")]
    Timeout {
        execution_id: String,
        elapsed_ms: u64,
    },
    #[error("session is disconnected")]
    Disconnected,
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
}
