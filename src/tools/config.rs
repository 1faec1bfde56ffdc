//! A tool server configuration: transport kind, launch/connection parameters, and per-transport
//! timing. One configuration describes one tool server and expands to N generated stub functions
//! at generation time (C5) and is embedded, serialized, into each generated stub so the stub can
//! reconstruct it at call time (C6).

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// The three transports a tool server may be reached over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    /// A local subprocess speaking newline-delimited JSON-RPC over stdio.
    Stdio(StdioTransport),
    /// An HTTP streaming ("streamable HTTP") endpoint.
    StreamableHttp { url: String },
    /// A legacy server-sent-events endpoint.
    Sse { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioTransport {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub transport: Transport,
    /// Upper bound on one `list_tools`/`call_tool` round trip, including connect and teardown.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_call_timeout")]
    pub call_timeout: Duration,
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ToolServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: Transport::Stdio(StdioTransport {
                command: command.into(),
                args,
                env: HashMap::new(),
            }),
            call_timeout: default_call_timeout(),
        }
    }

    pub fn streamable_http(url: impl Into<String>) -> Self {
        Self {
            transport: Transport::StreamableHttp { url: url.into() },
            call_timeout: default_call_timeout(),
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport: Transport::Sse { url: url.into() },
            call_timeout: default_call_timeout(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = ToolServerConfig::stdio("tool-server", vec!["--stdio".into()]);
        let json = serde_json::to_string(&config).unwrap();
        let back: ToolServerConfig = serde_json::from_str(&json).unwrap();
        match back.transport {
            Transport::Stdio(stdio) => assert_eq!(stdio.command, "tool-server"),
            other => panic!("expected Stdio, got {other:?}"),
        }
    }

    #[test]
    fn default_call_timeout_is_thirty_seconds() {
        let config = ToolServerConfig::sse("https://example.invalid/sse");
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }
}
