//! Crate-level configuration: defaults overridable by an explicit builder call, falling back to a
//! constant when unset, the same precedence order `core::env::Config` uses for Docker host
//! resolution. The Docker daemon endpoint itself is resolved separately, by
//! `core::env`/`core::client`, since it describes one external collaborator (the container
//! engine) this module does not duplicate.

use std::time::Duration;

use crate::container::WORKING_DIR;

const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_LIVENESS_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_LIVENESS_MAX_BACKOFF: Duration = Duration::from_secs(2);
const DEFAULT_TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Crate-wide defaults, overridable per call site. Constructed with [`SandboxConfig::default`]
/// and customized via its `with_*` builder methods.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    working_dir: String,
    liveness_timeout: Duration,
    liveness_initial_backoff: Duration,
    liveness_max_backoff: Duration,
    tool_call_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            working_dir: WORKING_DIR.to_string(),
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            liveness_initial_backoff: DEFAULT_LIVENESS_INITIAL_BACKOFF,
            liveness_max_backoff: DEFAULT_LIVENESS_MAX_BACKOFF,
            tool_call_timeout: DEFAULT_TOOL_CALL_TIMEOUT,
        }
    }
}

impl SandboxConfig {
    pub fn with_working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_liveness_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.liveness_initial_backoff = initial;
        self.liveness_max_backoff = max;
        self
    }

    pub fn with_tool_call_timeout(mut self, timeout: Duration) -> Self {
        self.tool_call_timeout = timeout;
        self
    }

    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_timeout
    }

    pub fn liveness_backoff(&self) -> (Duration, Duration) {
        (self.liveness_initial_backoff, self.liveness_max_backoff)
    }

    pub fn tool_call_timeout(&self) -> Duration {
        self.tool_call_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_crate_constants() {
        let config = SandboxConfig::default();
        assert_eq!(config.working_dir(), WORKING_DIR);
        assert_eq!(config.tool_call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = SandboxConfig::default().with_tool_call_timeout(Duration::from_secs(5));
        assert_eq!(config.tool_call_timeout(), Duration::from_secs(5));
    }
}
