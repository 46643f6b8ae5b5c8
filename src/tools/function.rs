//! 由函数构造的工具
//!
//! - FunctionTool：闭包 + 手写参数声明（ParamSpec）
//! - TypedTool：闭包 + 参数结构体，schema 由 schemars 推导，参数经 serde 反序列化
//!
//! 返回值只要求 Serialize；无法转成 JSON 的结果退化为其 Debug 字符串。

use std::fmt::{Debug, Display};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::tools::schema::{params_to_json_schema, schema_for_args, ParamSpec, ParamType};
use crate::tools::Tool;

type Handler = Arc<dyn Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync>;

/// 结果转 JSON；序列化失败时用字符串形式
pub fn to_json_or_string<R: Serialize + Debug>(result: &R) -> Value {
    serde_json::to_value(result).unwrap_or_else(|e| {
        tracing::debug!("Tool result is not JSON-serializable ({}), using string form", e);
        Value::String(format!("{:?}", result))
    })
}

/// 闭包工具：参数逐个声明
pub struct FunctionTool {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    handler: Handler,
}

impl FunctionTool {
    pub fn new<F, R, E>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<R, E> + Send + Sync + 'static,
        R: Serialize + Debug,
        E: Display,
    {
        let handler: Handler = Arc::new(move |args: &Map<String, Value>| {
            handler(args)
                .map(|r| to_json_or_string(&r))
                .map_err(|e| e.to_string())
        });
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler,
        }
    }

    /// 必填参数
    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params
            .push(ParamSpec::required(name, param_type).with_description(description));
        self
    }

    /// 可选参数
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params
            .push(ParamSpec::optional(name, param_type).with_description(description));
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        params_to_json_schema(&self.params)
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !args.contains_key(&p.name))
        {
            return Err(format!("Missing required parameter: {}", missing.name));
        }
        (self.handler)(&args)
    }
}

/// 参数结构体工具：A 为参数类型（JsonSchema + Deserialize），R 为返回类型
pub struct TypedTool<A, R> {
    name: String,
    description: String,
    schema: Value,
    handler: Arc<dyn Fn(A) -> Result<R, String> + Send + Sync>,
    _marker: PhantomData<fn() -> (A, R)>,
}

impl<A, R> TypedTool<A, R>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    R: Serialize + Debug + Send + 'static,
{
    pub fn new<F, E>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
        E: Display,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: schema_for_args::<A>(),
            handler: Arc::new(move |a| handler(a).map_err(|e| e.to_string())),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, R> Tool for TypedTool<A, R>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    R: Serialize + Debug + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let parsed: A = serde_json::from_value(Value::Object(args))
            .map_err(|e| format!("Invalid arguments: {}", e))?;
        (self.handler)(parsed).map(|r| to_json_or_string(&r))
    }
}
