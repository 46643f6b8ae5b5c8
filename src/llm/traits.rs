//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：一次 converse 即一轮模型调用，
//! 输入为 system prompt + 有序消息 + 工具描述，输出为文本、可选的思考内容与工具调用请求。

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolSpec;

/// 模型调用失败；编排循环不重试，直接向上传播
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode model response: {0}")]
    Decode(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Request(e.to_string())
    }
}

/// 一次模型调用的输入
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// 模型请求调用的一个工具
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// 调用 ID，工具结果消息据此回指
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// 一轮模型输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    /// 服务端单独返回的思考内容（如 reasoning_content）
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelTurn {
    /// 纯文本回答
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// 请求调用一个工具（可附带说明文字）
    pub fn tool_call(
        text: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::text(text).and_tool_call(id, name, arguments)
    }

    /// 追加一个工具调用请求
    pub fn and_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        self.tool_calls.push(ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        });
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 一轮模型调用
    async fn converse(&self, request: ModelRequest<'_>) -> Result<ModelTurn, LlmError>;

    /// 模型标识，用于日志
    fn model_id(&self) -> &str;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
