//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 注册时即生成 ToolSpec；一次 run 期间注册表只读。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::schema::{empty_object_schema, ToolSpec};

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON object）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型请求调用时使用）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        empty_object_schema()
    }

    /// 执行工具；Err 中的字符串会作为 `{"error": ...}` 写回给模型
    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String>;
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    spec: ToolSpec,
}

/// 工具注册表：保持注册顺序（决定发给模型的工具列表顺序），同名后注册者覆盖先注册者
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder 风格注册
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let spec = ToolSpec {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.parameters_schema(),
        };
        let entry = RegisteredTool { tool, spec };
        match self.index.get(&entry.spec.name) {
            Some(&i) => {
                tracing::debug!(tool = %entry.spec.name, "Replacing previously registered tool");
                self.tools[i] = entry;
            }
            None => {
                self.index.insert(entry.spec.name.clone(), self.tools.len());
                self.tools.push(entry);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec.name.clone()).collect()
    }

    /// 注册时生成的工具描述，按注册顺序
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
