//! The tool-client runtime (C6): invoked from generated stubs at call time. Opens a short-lived
//! session to a configured tool server over one of three transports, performs one of two
//! operations (`list_tools`, used only by the generator; `call_tool`, used by stub invocations),
//! and tears the transport down on completion or error. All three transports converge on `rmcp`'s
//! client service abstraction, so this module is the only place transport kind is matched on.

use std::time::Duration;

use rmcp::{
    model::CallToolRequestParam,
    transport::{
        sse_client::SseClientTransport, streamable_http_client::StreamableHttpClientTransport,
        TokioChildProcess,
    },
    ServiceExt,
};
use tokio::process::Command;

use super::{
    config::{Transport, ToolServerConfig},
    error::ToolClientError,
};

/// One tool advertised by a tool server.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Enumerates the tools a server advertises. Used by the generator (C5) at stub-generation time.
pub async fn list_tools(config: &ToolServerConfig) -> Result<Vec<ToolDescriptor>, ToolClientError> {
    with_timeout(config.call_timeout, async {
        match &config.transport {
            Transport::Stdio(stdio) => {
                let transport = spawn_stdio(stdio)?;
                let client = ().serve(transport).await.map_err(transport_err)?;
                let tools = client
                    .list_tools(Default::default())
                    .await
                    .map_err(protocol_err)?;
                let descriptors = tools.tools.into_iter().map(into_descriptor).collect();
                client.cancel().await.map_err(transport_err)?;
                Ok(descriptors)
            }
            Transport::StreamableHttp { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.clone());
                let client = ().serve(transport).await.map_err(transport_err)?;
                let tools = client
                    .list_tools(Default::default())
                    .await
                    .map_err(protocol_err)?;
                let descriptors = tools.tools.into_iter().map(into_descriptor).collect();
                client.cancel().await.map_err(transport_err)?;
                Ok(descriptors)
            }
            Transport::Sse { url } => {
                let transport = SseClientTransport::start(url.clone())
                    .await
                    .map_err(transport_err)?;
                let client = ().serve(transport).await.map_err(transport_err)?;
                let tools = client
                    .list_tools(Default::default())
                    .await
                    .map_err(protocol_err)?;
                let descriptors = tools.tools.into_iter().map(into_descriptor).collect();
                client.cancel().await.map_err(transport_err)?;
                Ok(descriptors)
            }
        }
    })
    .await
}

/// Invokes one named tool with validated arguments and returns its decoded result.
pub async fn call_tool(
    config: &ToolServerConfig,
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<serde_json::Value, ToolClientError> {
    let params = build_params(tool_name, arguments)?;

    with_timeout(config.call_timeout, async {
        match &config.transport {
            Transport::Stdio(stdio) => {
                let transport = spawn_stdio(stdio)?;
                let client = ().serve(transport).await.map_err(transport_err)?;
                let result = client.call_tool(params).await.map_err(protocol_err);
                client.cancel().await.map_err(transport_err)?;
                decode_result(tool_name, result?)
            }
            Transport::StreamableHttp { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.clone());
                let client = ().serve(transport).await.map_err(transport_err)?;
                let result = client.call_tool(params).await.map_err(protocol_err);
                client.cancel().await.map_err(transport_err)?;
                decode_result(tool_name, result?)
            }
            Transport::Sse { url } => {
                let transport = SseClientTransport::start(url.clone())
                    .await
                    .map_err(transport_err)?;
                let client = ().serve(transport).await.map_err(transport_err)?;
                let result = client.call_tool(params).await.map_err(protocol_err);
                client.cancel().await.map_err(transport_err)?;
                decode_result(tool_name, result?)
            }
        }
    })
    .await
}

/// Decodes a single `call_tool` response: a tool-reported failure surfaces as
/// [`ToolClientError::ToolFailed`]; a successful result's text content is parsed as JSON,
/// falling back to the raw concatenated text if it isn't.
fn decode_result(
    tool_name: &str,
    result: rmcp::model::CallToolResult,
) -> Result<serde_json::Value, ToolClientError> {
    if result.is_error.unwrap_or(false) {
        let message = result
            .content
            .iter()
            .filter_map(|block| block.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(ToolClientError::ToolFailed {
            tool: tool_name.to_string(),
            message,
        });
    }

    let content = result
        .content
        .into_iter()
        .filter_map(|block| block.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("");

    Ok(serde_json::from_str(&content).unwrap_or(serde_json::Value::String(content)))
}

fn build_params(
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<CallToolRequestParam, ToolClientError> {
    let arguments = match arguments {
        serde_json::Value::Object(map) => Some(map),
        serde_json::Value::Null => None,
        other => {
            return Err(ToolClientError::Protocol(format!(
                "tool arguments must be a JSON object, got {other}"
            )))
        }
    };

    Ok(CallToolRequestParam {
        name: tool_name.to_string().into(),
        arguments,
    })
}

fn spawn_stdio(
    stdio: &super::config::StdioTransport,
) -> Result<TokioChildProcess, ToolClientError> {
    let mut command = Command::new(&stdio.command);
    command.args(&stdio.args);
    for (key, value) in &stdio.env {
        command.env(key, value);
    }
    TokioChildProcess::new(command).map_err(ToolClientError::Spawn)
}

fn into_descriptor(tool: rmcp::model::Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn transport_err<E: std::fmt::Display>(err: E) -> ToolClientError {
    ToolClientError::Transport(err.to_string())
}

fn protocol_err<E: std::fmt::Display>(err: E) -> ToolClientError {
    ToolClientError::Protocol(err.to_string())
}

async fn with_timeout<F, T>(timeout: Duration, fut: F) -> Result<T, ToolClientError>
where
    F: std::future::Future<Output = Result<T, ToolClientError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ToolClientError::Timeout {
            elapsed_ms: timeout.as_millis() as u64,
        }),
    }
}
