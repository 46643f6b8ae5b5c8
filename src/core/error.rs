//! Agent 错误类型
//!
//! 传播策略：单次工具调用的错误（ToolError）在循环内被捕获并写入推理轨迹，不会中止运行；
//! 模型传输与存储后端的错误一律向调用方传播，便于重试或告警。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::session::StoreError;

/// Agent 对外可见的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型调用失败：本次 run 中止，不在内部重试
    #[error("Transport error: {0}")]
    Transport(#[from] LlmError),

    /// 参数非法（如 max_steps 为 0），在构建阶段即报出
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}

/// 单个工具调用的失败原因；只会出现在 ToolInvocation 的 error 结果里
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool '{name}'. Available tools: {available}")]
    UnknownTool { name: String, available: String },

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },
}
