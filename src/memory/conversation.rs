//! 对话消息模型
//!
//! 一条消息 = 角色 + 有序内容块（文本 / 工具调用请求 / 工具结果）。
//! run 期间由编排循环持有，run 结束后整体写入 SessionStore。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（system prompt 不作为消息保存，随每次模型调用单独发送）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// 消息内容块
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// 模型请求调用的工具
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// 工具执行结果，按 tool_use_id 与请求对应
    ToolResult {
        tool_use_id: String,
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// 带工具调用请求的 assistant 消息；text 为空时只保留 ToolUse 块
    pub fn assistant_with_tool_uses(
        text: impl Into<String>,
        tool_uses: impl IntoIterator<Item = (String, String, Value)>,
    ) -> Self {
        let text = text.into();
        let mut content = Vec::new();
        if !text.trim().is_empty() {
            content.push(ContentBlock::Text { text });
        }
        content.extend(
            tool_uses
                .into_iter()
                .map(|(id, name, input)| ContentBlock::ToolUse { id, name, input }),
        );
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content,
                is_error,
            }],
        }
    }

    /// 所有文本块按换行拼接
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// (id, name, input) 形式的工具调用请求
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}
