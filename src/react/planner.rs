//! Planner：一轮模型调用与思考内容提取
//!
//! 持有 LLM 与 system prompt；plan 把对话历史与工具描述发给模型，
//! 并把 `<thinking>...</thinking>` 标签内容与服务端思考字段合并为本轮的 thinking。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{LlmClient, ModelRequest, ToolCallRequest};
use crate::memory::Message;
use crate::tools::ToolSpec;

const THINKING_OPEN: &str = "<thinking>";
const THINKING_CLOSE: &str = "</thinking>";

/// 拆分文本中的 `<thinking>` 段：返回 (思考内容, 其余可见文本)
///
/// 多段思考按换行拼接；缺少闭合标签时，开标签之后的全部内容都算作思考。
pub fn split_thinking(text: &str) -> (String, String) {
    let mut thinking = Vec::new();
    let mut visible = String::new();
    let mut rest = text;

    while let Some(start) = rest.find(THINKING_OPEN) {
        visible.push_str(&rest[..start]);
        let after_open = &rest[start + THINKING_OPEN.len()..];
        match after_open.find(THINKING_CLOSE) {
            Some(end) => {
                thinking.push(after_open[..end].trim().to_string());
                rest = &after_open[end + THINKING_CLOSE.len()..];
            }
            None => {
                thinking.push(after_open.trim().to_string());
                rest = "";
            }
        }
    }
    visible.push_str(rest);

    let thinking = thinking
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (thinking, visible.trim().to_string())
}

/// 单轮规划结果
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTurn {
    /// 思考内容（标签内文本 + 服务端思考字段）
    pub thinking: String,
    /// 去掉思考标签后的可见文本
    pub response: String,
    /// 模型原始文本
    pub raw_text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl PlannedTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// 作为推理步骤记录的 thinking：思考内容加上模型随工具调用给出的说明文字
    pub fn step_thinking(&self) -> String {
        [self.thinking.as_str(), self.response.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 作为最终回答的文本；去掉思考后为空时退回原始文本
    pub fn final_response(&self) -> String {
        if self.response.is_empty() {
            self.raw_text.trim().to_string()
        } else {
            self.response.clone()
        }
    }
}

/// Planner：持有 LLM 与可选的 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: Option<String>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: Option<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 一轮模型调用；传输错误原样上抛，不在此重试
    pub async fn plan(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<PlannedTurn, AgentError> {
        let turn = self
            .llm
            .converse(ModelRequest {
                system: self.system_prompt.as_deref(),
                messages,
                tools,
            })
            .await?;

        let (tag_thinking, response) = split_thinking(&turn.text);
        let thinking = [turn.reasoning.as_deref().unwrap_or_default(), tag_thinking.as_str()]
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(PlannedTurn {
            thinking,
            response,
            raw_text: turn.text,
            tool_calls: turn.tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelTurn};

    #[test]
    fn test_split_thinking() {
        let (thinking, visible) =
            split_thinking("<thinking>Add the numbers.</thinking>\nThe answer is 4.");
        assert_eq!(thinking, "Add the numbers.");
        assert_eq!(visible, "The answer is 4.");

        let (thinking, visible) = split_thinking("plain answer");
        assert_eq!(thinking, "");
        assert_eq!(visible, "plain answer");

        let (thinking, visible) = split_thinking("a <thinking>one</thinking> b <thinking>two");
        assert_eq!(thinking, "one\ntwo");
        assert_eq!(visible, "a  b");
    }

    #[test]
    fn test_final_response_falls_back_to_raw_text() {
        let turn = PlannedTurn {
            thinking: "only thinking".into(),
            response: String::new(),
            raw_text: "<thinking>only thinking</thinking>".into(),
            tool_calls: Vec::new(),
        };
        assert_eq!(turn.final_response(), "<thinking>only thinking</thinking>");
        assert_eq!(turn.step_thinking(), "only thinking");
    }

    #[tokio::test]
    async fn test_plan_merges_reasoning_and_tags() {
        let llm = Arc::new(MockLlmClient::scripted([ModelTurn::text(
            "<thinking>from tags</thinking>Result",
        )
        .with_reasoning("from provider")]));
        let planner = Planner::new(llm.clone(), Some("You are helpful.".into()));
        let turn = planner.plan(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(turn.thinking, "from provider\nfrom tags");
        assert_eq!(turn.response, "Result");
        assert_eq!(llm.requests()[0].system.as_deref(), Some("You are helpful."));
    }

    #[tokio::test]
    async fn test_blank_system_prompt_is_dropped() {
        let llm = Arc::new(MockLlmClient::scripted([ModelTurn::text("ok")]));
        let planner = Planner::new(llm.clone(), Some("  ".into()));
        planner.plan(&[Message::user("hi")], &[]).await.unwrap();
        assert!(llm.requests()[0].system.is_none());
    }
}
