//! 工具参数 Schema
//!
//! 注册时一次性把工具声明的参数映射为 JSON Schema（ToolSpec），之后每次模型调用直接复用。
//! 两种来源：手写的 ParamSpec 列表，或由参数结构体经 schemars 推导。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 参数类型（JSON Schema 基本类型）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// 单个参数声明：名称、类型、可选描述、是否必填
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: Option<String>,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 发送给模型的工具描述
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 空参数 schema
pub fn empty_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// ParamSpec 列表 -> JSON Schema（object，properties 按声明顺序，required 列出必填项）
pub fn params_to_json_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for p in params {
        let mut prop = Map::new();
        prop.insert("type".to_string(), json!(p.param_type));
        if let Some(desc) = &p.description {
            prop.insert("description".to_string(), json!(desc));
        }
        properties.insert(p.name.clone(), Value::Object(prop));
        if p.required {
            required.push(json!(p.name));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// 由参数结构体推导 schema；去掉 `$schema` / `title` 这类对模型无用的字段
pub fn schema_for_args<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| empty_object_schema());
    if let Value::Object(obj) = &mut value {
        obj.remove("$schema");
        obj.remove("title");
        if !obj.contains_key("properties") {
            obj.insert("properties".to_string(), json!({}));
        }
    }
    value
}
