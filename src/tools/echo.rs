//! Echo 工具（测试与演示用）

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::schema::{params_to_json_schema, ParamSpec, ParamType};
use crate::tools::Tool;

/// Echo 工具：原样回显 text
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged. Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        params_to_json_schema(&[
            ParamSpec::required("text", ParamType::String).with_description("Text to echo")
        ])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: text")?;
        Ok(json!(text))
    }
}
