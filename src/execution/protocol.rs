//! Wire shape of messages exchanged over the kernel gateway's bidirectional channel.
//!
//! The envelope is schemaless at the `content` level (varies by `header.type`); we model it as a
//! tagged struct with a free-form JSON body and classify it after the fact, per the "dynamic JSON
//! payloads" design note: tolerate unknown types, match on type + `parent_header.id`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParentHeader {
    pub id: Option<String>,
}

/// A single message on the kernel channel, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub header: Header,
    #[serde(default)]
    pub parent_header: ParentHeader,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl GatewayMessage {
    pub fn execute_request(execution_id: impl Into<String>, code: &str) -> Self {
        Self {
            header: Header {
                id: execution_id.into(),
                msg_type: "execute_request".into(),
            },
            parent_header: ParentHeader::default(),
            content: serde_json::json!({
                "code": code,
                "silent": false,
                "store_history": false,
                "allow_stdin": false,
            }),
        }
    }

    /// The sole termination signal for an execution: a `status` message addressed to it whose
    /// `content.execution_state` is `"idle"`.
    pub fn is_idle_marker_for(&self, execution_id: &str) -> bool {
        self.header.msg_type == "status"
            && self.parent_header.id.as_deref() == Some(execution_id)
            && self
                .content
                .get("execution_state")
                .and_then(|v| v.as_str())
                == Some("idle")
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_header.id.as_deref()
    }
}

/// A classification of a channel message's payload, once addressed to a specific execution.
#[derive(Debug, Clone)]
pub enum MessagePayload {
    /// `stream` message: a chunk of text output.
    Stream(String),
    /// `display_data` / `execute_result` carrying a decoded raster image.
    Image(Vec<u8>),
    /// `error` message: the kernel raised an exception evaluating this execution's code.
    Error(ErrorRecord),
    /// The idle marker: this execution is complete.
    Idle,
    /// Anything else (e.g. `execute_input` echo); logged and otherwise ignored.
    Other,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub name: String,
    pub value: String,
    pub traceback: Vec<String>,
}

/// Classifies a message already known to be addressed to `execution_id`.
pub fn classify(msg: &GatewayMessage, execution_id: &str) -> MessagePayload {
    if msg.is_idle_marker_for(execution_id) {
        return MessagePayload::Idle;
    }

    match msg.header.msg_type.as_str() {
        "stream" => {
            let text = msg
                .content
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            MessagePayload::Stream(text)
        }
        "display_data" | "execute_result" => msg
            .content
            .get("data")
            .and_then(|data| data.get("image/png"))
            .and_then(|v| v.as_str())
            .and_then(|b64| base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64).ok())
            .map(MessagePayload::Image)
            .unwrap_or(MessagePayload::Other),
        "error" => {
            let name = msg
                .content
                .get("ename")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let value = msg
                .content
                .get("evalue")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let traceback = msg
                .content
                .get("traceback")
                .and_then(|v| v.as_array())
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|l| l.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            MessagePayload::Error(ErrorRecord {
                name,
                value,
                traceback,
            })
        }
        _ => MessagePayload::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_idle_marker_for_matching_execution() {
        let msg = GatewayMessage {
            header: Header {
                id: "m1".into(),
                msg_type: "status".into(),
            },
            parent_header: ParentHeader {
                id: Some("exec-1".into()),
            },
            content: serde_json::json!({"execution_state": "idle"}),
        };
        assert!(msg.is_idle_marker_for("exec-1"));
        assert!(!msg.is_idle_marker_for("exec-2"));
    }

    #[test]
    fn classifies_stream_chunk() {
        let msg = GatewayMessage {
            header: Header {
                id: "m2".into(),
                msg_type: "stream".into(),
            },
            parent_header: ParentHeader {
                id: Some("exec-1".into()),
            },
            content: serde_json::json!({"name": "stdout", "text": "Hello, world!\n"}),
        };
        match classify(&msg, "exec-1") {
            MessagePayload::Stream(text) => assert_eq!(text, "Hello, world!\n"),
            other => panic!("expected Stream, got {other:?}"),
        }
    }

    #[test]
    fn classifies_error_record() {
        let msg = GatewayMessage {
            header: Header {
                id: "m3".into(),
                msg_type: "error".into(),
            },
            parent_header: ParentHeader {
                id: Some("exec-1".into()),
            },
            content: serde_json::json!({
                "ename": "NameError",
                "evalue": "name 'x' is not defined",
                "traceback": ["Traceback (most recent call last):", "NameError: name 'x' is not defined"],
            }),
        };
        match classify(&msg, "exec-1") {
            MessagePayload::Error(record) => {
                assert_eq!(record.name, "NameError");
                assert!(record.value.contains("not defined"));
                assert_eq!(record.traceback.len(), 2);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
