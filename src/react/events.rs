//! 编排过程事件：用于在终端或前端展示思考、工具调用、结果与最终回答

use std::fmt;

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 开始一轮模型调用
    StepStarted { step: usize, max_steps: usize },
    /// 本轮的思考内容
    Thinking { text: String },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    ToolResult {
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 实时模式下推理快照已写入
    ReasoningSaved { step: usize },
    /// 步数预算耗尽
    StepLimitReached { max_steps: usize },
    /// 最终回答
    FinalAnswer { text: String },
}

impl fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentEvent::StepStarted { step, max_steps } => {
                write!(f, "── step {}/{} ──", step, max_steps)
            }
            AgentEvent::Thinking { text } => write!(f, "[thinking] {}", text),
            AgentEvent::ToolCall { tool, args } => write!(f, "[tool] {} {}", tool, args),
            AgentEvent::ToolResult { tool, ok, preview } => {
                let tag = if *ok { "ok" } else { "error" };
                write!(f, "[{}] {} -> {}", tag, tool, preview)
            }
            AgentEvent::ReasoningSaved { step } => {
                write!(f, "[saved] reasoning snapshot after step {}", step)
            }
            AgentEvent::StepLimitReached { max_steps } => {
                write!(f, "[limit] stopped after {} steps", max_steps)
            }
            AgentEvent::FinalAnswer { text } => write!(f, "[answer] {}", text),
        }
    }
}
