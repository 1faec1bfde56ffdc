//! The tool-client generator (C5): lists a tool server's tools and materializes one importable
//! Python module per server, under a caller-supplied namespace, with one typed stub function per
//! tool. Generation is write-once per server identifier; re-generating overwrites atomically via
//! a temp-file-then-rename, mirroring the "no partial results" discipline elsewhere in this crate.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{
    config::ToolServerConfig,
    error::GeneratorError,
    runtime::{list_tools, ToolDescriptor},
};

/// Result of one generation run.
#[derive(Debug, Clone)]
pub struct GeneratedStubs {
    pub tool_names: Vec<String>,
    pub module_path: PathBuf,
}

/// Generates stubs for `server_name` under `namespace_root/server_name/__init__.py`, rooted at
/// `working_dir`. Returns the tool names generated, in server-advertised order.
pub async fn generate(
    working_dir: &Path,
    namespace_root: &str,
    server_name: &str,
    config: &ToolServerConfig,
) -> Result<GeneratedStubs, GeneratorError> {
    let tools = list_tools(config).await?;

    let module_dir = working_dir.join(namespace_root).join(sanitize(server_name));
    tokio::fs::create_dir_all(&module_dir).await?;

    let mut body = String::from(PRELUDE);
    let config_json = serde_json::to_string(config).expect("ToolServerConfig always serializes");
    let mut tool_names = Vec::with_capacity(tools.len());

    for tool in &tools {
        body.push_str(&render_stub(server_name, &config_json, tool)?);
        tool_names.push(tool.name.clone());
    }

    let module_path = module_dir.join("__init__.py");
    let tmp_path = module_dir.join(".__init__.py.tmp");
    tokio::fs::write(&tmp_path, body.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, &module_path).await?;

    Ok(GeneratedStubs {
        tool_names,
        module_path,
    })
}

const PRELUDE: &str = "\
# Generated by the tool-client generator. Do not edit by hand; re-generate instead.
import json
import subprocess

from pydantic import BaseModel, ConfigDict


async def _invoke(config_json: str, tool_name: str, arguments: dict) -> object:
    request = json.dumps({\"config\": json.loads(config_json), \"tool_name\": tool_name, \"arguments\": arguments})
    proc = await __import__(\"asyncio\").create_subprocess_exec(
        \"tool-invoke\",
        stdin=subprocess.PIPE,
        stdout=subprocess.PIPE,
        stderr=subprocess.PIPE,
    )
    stdout, stderr = await proc.communicate(request.encode())
    if proc.returncode != 0:
        raise RuntimeError(f\"tool '{tool_name}' failed: {stderr.decode(errors='replace')}\")
    return json.loads(stdout)

";

/// Renders one tool as: a pydantic parameter record, and an async function that validates
/// arguments against it, then delegates to the tool-invoke helper (C6) with (server
/// configuration, tool name, validated arguments).
fn render_stub(
    server_name: &str,
    config_json: &str,
    tool: &ToolDescriptor,
) -> Result<String, GeneratorError> {
    let params_class = format!("_{}Params", to_pascal_case(&tool.name));
    let fields = render_fields(tool)?;
    let doc = tool
        .description
        .clone()
        .unwrap_or_else(|| format!("Calls tool '{}' on server '{}'.", tool.name, server_name));
    let escaped_config = config_json.replace('\\', "\\\\").replace('"', "\\\"");

    Ok(format!(
        "\nclass {params_class}(BaseModel):\n\
         {fields}\n\
         \n\
         async def {func_name}(**kwargs) -> object:\n\
         \u{20}\u{20}\u{20}\u{20}\"\"\"{doc}\"\"\"\n\
         \u{20}\u{20}\u{20}\u{20}params = {params_class}(**kwargs)\n\
         \u{20}\u{20}\u{20}\u{20}return await _invoke(\"{escaped_config}\", \"{tool_name}\", params.model_dump())\n",
        func_name = sanitize(&tool.name),
        tool_name = tool.name,
    ))
}

/// Translates the tool's JSON Schema `properties`/`required` into pydantic field declarations.
/// Schemas that are not a plain `object` schema (or that allow arbitrary additional properties)
/// degrade to an open record: a single `**kwargs`-shaped passthrough field, forwarded as-is.
fn render_fields(tool: &ToolDescriptor) -> Result<String, GeneratorError> {
    let Value::Object(schema) = &tool.input_schema else {
        return Err(GeneratorError::InvalidSchema {
            tool: tool.name.clone(),
            reason: "input schema is not a JSON object".into(),
        });
    };

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return open_record_fields();
    }

    let properties = match schema.get("properties").and_then(Value::as_object) {
        Some(properties) => properties,
        None => return open_record_fields(),
    };

    let required: std::collections::HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let allows_unknown = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut lines = Vec::new();
    for (name, prop_schema) in properties {
        let py_type = json_schema_to_py_type(prop_schema);
        if required.contains(name.as_str()) {
            lines.push(format!("    {name}: {py_type}"));
        } else {
            lines.push(format!("    {name}: {py_type} | None = None"));
        }
    }

    if allows_unknown {
        lines.push("\n    model_config = ConfigDict(extra=\"allow\")".to_string());
    }

    if lines.is_empty() {
        lines.push("    model_config = ConfigDict(extra=\"allow\")".to_string());
    }

    Ok(lines.join("\n"))
}

fn open_record_fields() -> Result<String, GeneratorError> {
    Ok("    model_config = ConfigDict(extra=\"allow\")".to_string())
}

fn json_schema_to_py_type(schema: &Value) -> &'static str {
    match schema.get("type").and_then(Value::as_str) {
        Some("string") => "str",
        Some("integer") => "int",
        Some("number") => "float",
        Some("boolean") => "bool",
        Some("array") => "list",
        Some("object") => "dict",
        _ => "object",
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn to_pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, schema: Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: Some(format!("does {name}")),
            input_schema: schema,
        }
    }

    #[test]
    fn renders_required_and_optional_fields() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}, "count": {"type": "integer"}},
            "required": ["message"],
        });
        let fields = render_fields(&tool("tool_1", schema)).unwrap();
        assert!(fields.contains("message: str"));
        assert!(fields.contains("count: int | None = None"));
    }

    #[test]
    fn degrades_to_open_record_for_additional_properties() {
        let schema = serde_json::json!({"type": "object", "additionalProperties": true});
        let fields = render_fields(&tool("tool_2", schema)).unwrap();
        assert!(fields.contains("extra=\"allow\""));
    }

    #[test]
    fn rejects_non_object_schema_root_as_open_record_not_error() {
        let schema = serde_json::json!({"type": "string"});
        let fields = render_fields(&tool("tool_3", schema)).unwrap();
        assert!(fields.contains("extra=\"allow\""));
    }

    #[test]
    fn to_pascal_case_handles_snake_case() {
        assert_eq!(to_pascal_case("tool_1"), "Tool1");
        assert_eq!(to_pascal_case("do-a-thing"), "DoAThing");
    }

    #[test]
    fn render_stub_embeds_tool_name_and_docstring() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"],
        });
        let stub = render_stub("srv", "{}", &tool("tool_1", schema)).unwrap();
        assert!(stub.contains("async def tool_1"));
        assert!(stub.contains("does tool_1"));
        assert!(stub.contains("class _Tool1Params"));
    }

    #[tokio::test]
    async fn generate_writes_init_py_with_every_tool() {
        let dir = tempfile::tempdir().unwrap();
        // This exercises only the file-writing half; `list_tools` would require a live server,
        // so the property-level protocol behavior is covered by `render_stub`/`render_fields`
        // unit tests above and by the daemon-gated integration tests in `tests/`.
        let module_dir = dir.path().join("generated_tools").join("srv");
        tokio::fs::create_dir_all(&module_dir).await.unwrap();
        let body = format!(
            "{PRELUDE}{}",
            render_stub(
                "srv",
                "{}",
                &tool(
                    "tool_1",
                    serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]})
                )
            )
            .unwrap()
        );
        tokio::fs::write(module_dir.join("__init__.py"), body).await.unwrap();

        let written = tokio::fs::read_to_string(module_dir.join("__init__.py"))
            .await
            .unwrap();
        assert!(written.contains("async def tool_1"));
    }
}
