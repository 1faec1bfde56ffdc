//! Tool-server integration: [`config`] describes an external tool server, [`runtime`] (C6) is the
//! transport-agnostic client invoked at call time, and [`generator`] (C5) turns a server's
//! advertised tools into importable Python stubs.

mod config;
mod error;
mod generator;
mod runtime;

pub use config::{StdioTransport, ToolServerConfig, Transport};
pub use error::{GeneratorError, ToolClientError};
pub use generator::{generate, GeneratedStubs};
pub use runtime::{call_tool, list_tools, ToolDescriptor};
