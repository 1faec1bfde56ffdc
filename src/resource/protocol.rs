//! Wire shapes shared by the resource client and server: the JSON bodies of the POST/response
//! endpoints. File and tar bodies are plain byte streams and have no dedicated type here.

use serde::{Deserialize, Serialize};

use crate::tools::ToolServerConfig;

/// Body of `POST /copy`: an intra-container, server-side copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRequest {
    pub src: String,
    pub dst: String,
}

/// Body of `POST /tools/{server_name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateStubsRequest {
    pub config: ToolServerConfig,
}

/// Response of `POST /tools/{server_name}`: the tool names generated, in server-advertised order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateStubsResponse {
    pub tool_names: Vec<String>,
}

/// Response of `GET /modules/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSourceResponse {
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_request_round_trips() {
        let req = CopyRequest {
            src: "a.txt".into(),
            dst: "b.txt".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: CopyRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.src, "a.txt");
        assert_eq!(back.dst, "b.txt");
    }
}
