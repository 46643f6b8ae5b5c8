//! 推理轨迹数据模型：ToolInvocation / ReasoningStep / ReasoningTrace
//!
//! 字段名即持久化格式（JSON），读取旧记录时依赖这些名字保持不变。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 工具调用结果状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Error,
}

/// 一次工具调用：名称、输入参数、结果（失败时为 `{"error": "..."}`）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub inputs: Map<String, Value>,
    pub result: Value,
    pub status: InvocationStatus,
}

impl ToolInvocation {
    pub fn success(name: impl Into<String>, inputs: Map<String, Value>, result: Value) -> Self {
        Self {
            name: name.into(),
            inputs,
            result,
            status: InvocationStatus::Success,
        }
    }

    pub fn failure(
        name: impl Into<String>,
        inputs: Map<String, Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            result: json!({ "error": message.into() }),
            status: InvocationStatus::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == InvocationStatus::Error
    }

    pub fn error_message(&self) -> Option<&str> {
        if self.is_error() {
            self.result.get("error").and_then(|v| v.as_str())
        } else {
            None
        }
    }
}

/// 单步推理：步号从 1 开始严格递增
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_number: usize,
    pub timestamp: DateTime<Utc>,
    pub thinking: String,
    pub tools: Vec<ToolInvocation>,
}

/// 一次 run 的完整推理轨迹
///
/// `end_time` 为 None 表示尚未 finalize（实时模式下写出的中间快照）。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub session_id: Option<String>,
    pub query: String,
    pub steps: Vec<ReasoningStep>,
    pub total_steps: usize,
    pub final_thinking: String,
    pub final_response: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// 为满足大小上限而裁剪过内容
    pub exceeded_size_limit: bool,
    /// 步数预算耗尽，final_response 只是部分回答
    pub step_limit_reached: bool,
}

impl ReasoningTrace {
    pub fn new(session_id: Option<&str>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.map(String::from),
            query: query.into(),
            steps: Vec::new(),
            total_steps: 0,
            final_thinking: String::new(),
            final_response: String::new(),
            start_time: Utc::now(),
            end_time: None,
            exceeded_size_limit: false,
            step_limit_reached: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// 按执行顺序遍历所有工具调用
    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.steps.iter().flat_map(|s| s.tools.iter())
    }
}
