//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 按脚本依次返回预设的 ModelTurn 或错误；脚本用完后回退到默认行为：
//! 有 echo 工具时先请求 echo 回显用户最后一条消息，拿到工具结果后给出最终回答。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, ModelRequest, ModelTurn};
use crate::memory::{ContentBlock, Message, Role};

/// 被记录下来的一次请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ModelTurn, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定的模型输出
    pub fn scripted(turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        let client = Self::new();
        lock(&client.script).extend(turns.into_iter().map(Ok));
        client
    }

    pub fn push_turn(&self, turn: ModelTurn) {
        lock(&self.script).push_back(Ok(turn));
    }

    /// 下一次调用返回传输错误
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.script).push_back(Err(message.into()));
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn default_turn(request: &ModelRequest<'_>) -> ModelTurn {
        let last = request.messages.last();
        if let Some(m) = last.filter(|m| m.role == Role::Tool) {
            let result = m
                .content
                .iter()
                .find_map(|b| match b {
                    ContentBlock::ToolResult { content, .. } => Some(match content {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
                    _ => None,
                })
                .unwrap_or_default();
            return ModelTurn::text(format!("Echo from Mock: {}", result));
        }

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_else(|| "(no input)".to_string());

        if request.tools.iter().any(|t| t.name == "echo") {
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            ModelTurn::tool_call("", id, "echo", json!({ "text": last_user }))
        } else {
            ModelTurn::text(format!("Echo from Mock: {}", last_user))
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn converse(&self, request: ModelRequest<'_>) -> Result<ModelTurn, LlmError> {
        lock(&self.requests).push(RecordedRequest {
            system: request.system.map(String::from),
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });

        let scripted = lock(&self.script).pop_front();
        match scripted {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(LlmError::Request(message)),
            None => Ok(Self::default_turn(&request)),
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
