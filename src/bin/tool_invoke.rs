//! Helper binary invoked by generated tool stubs (see `ipybox_host::tools::generator`). Reads one
//! JSON request from stdin, shaped `{"config": ToolServerConfig, "tool_name": str, "arguments":
//! object}`, invokes the named tool via [`ipybox_host::tools::call_tool`] (C6), and writes the
//! decoded JSON result to stdout. A non-zero exit with a diagnostic on stderr signals failure, so
//! the calling Python stub can surface it as an exception.

use std::io::Read;

use ipybox_host::tools::{call_tool, ToolServerConfig};
use serde::Deserialize;

#[derive(Deserialize)]
struct Request {
    config: ToolServerConfig,
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let mut input = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut input) {
        eprintln!("tool-invoke: failed to read request from stdin: {err}");
        std::process::exit(1);
    }

    let request: Request = match serde_json::from_str(&input) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("tool-invoke: malformed request: {err}");
            std::process::exit(1);
        }
    };

    match call_tool(&request.config, &request.tool_name, request.arguments).await {
        Ok(result) => {
            println!("{}", serde_json::to_string(&result).expect("JSON Value always serializes"));
        }
        Err(err) => {
            eprintln!("tool-invoke: {err}");
            std::process::exit(1);
        }
    }
}
