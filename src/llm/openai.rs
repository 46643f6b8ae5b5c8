//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 调用任意 OpenAI 兼容的 `/chat/completions` 端点（可配置 base_url），使用 function calling；
//! 支持 DeepSeek、OpenAI、自建代理等。消息与响应的转换是纯函数，便于离线测试。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, ModelRequest, ModelTurn, ToolCallRequest};
use crate::memory::{ContentBlock, Message, Role};
use crate::tools::ToolSpec;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// 默认请求超时（秒）
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 采样参数；None 时交给服务端默认值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceSettings {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    settings: InferenceSettings,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    /// api_key 为 None 时读取 `OPENAI_API_KEY`
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
            settings: InferenceSettings::default(),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_settings(mut self, settings: InferenceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 设置单次请求超时（覆盖整个请求-响应过程）
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 获取累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn converse(&self, request: ModelRequest<'_>) -> Result<ModelTurn, LlmError> {
        let body = build_request_body(&self.model, &self.settings, request);
        let endpoint = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling chat completions"
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let completion: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Decode(e.to_string()))?;
        if let Some(usage) = &completion.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        parse_response(completion)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

/// `/chat/completions` 请求体
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    /// 无工具时省略
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// 请求与响应共用的消息结构
///
/// `reasoning_content` 仅出现在 DeepSeek 等推理模型的响应中。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    fn new(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: WireFunctionCall,
}

/// arguments 按协议是 JSON 字符串，部分兼容端点直接给对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: WireMessage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

fn function_type() -> String {
    "function".to_string()
}

pub fn build_request_body(
    model: &str,
    settings: &InferenceSettings,
    request: ModelRequest<'_>,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: to_wire_messages(request.system, request.messages),
        tools: to_wire_tools(request.tools),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        stream: false,
    }
}

pub fn to_wire_tools(tools: &[ToolSpec]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            tool_type: function_type(),
            function: WireFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// 内部消息转为 chat completions 格式；一条 Tool 消息中的每个结果块各自成为一条 `tool` 消息
pub fn to_wire_messages(system: Option<&str>, messages: &[Message]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        wire.push(WireMessage::new("system", Some(system.to_string())));
    }
    for message in messages {
        match message.role {
            Role::User => wire.push(WireMessage::new("user", Some(message.text()))),
            Role::Assistant => {
                let text = message.text();
                let tool_calls: Vec<WireToolCall> = message
                    .tool_uses()
                    .map(|(id, name, input)| WireToolCall {
                        id: Some(id.to_string()),
                        call_type: function_type(),
                        function: WireFunctionCall {
                            name: name.to_string(),
                            arguments: Value::String(input.to_string()),
                        },
                    })
                    .collect();
                let content = if text.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(text)
                };
                let mut m = WireMessage::new("assistant", content);
                if !tool_calls.is_empty() {
                    m.tool_calls = Some(tool_calls);
                }
                wire.push(m);
            }
            Role::Tool => {
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let mut m = WireMessage::new("tool", Some(value_as_text(content)));
                        m.tool_call_id = Some(tool_use_id.clone());
                        wire.push(m);
                    }
                }
            }
        }
    }
    wire
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 字符串形式的 arguments 解析为 JSON；无法解析时原样保留为字符串，由执行器记为参数错误
fn decode_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Value::Null,
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

/// 取 `choices[0].message`：content、reasoning_content、tool_calls
pub fn parse_response(response: ChatCompletionResponse) -> Result<ModelTurn, LlmError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::Decode("response has no choices[0].message".to_string()))?;

    let text = message.content.unwrap_or_default();
    let reasoning = message.reasoning_content.filter(|s| !s.trim().is_empty());
    let tool_calls: Vec<ToolCallRequest> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: call.function.name,
            arguments: decode_arguments(call.function.arguments),
        })
        .collect();

    if text.trim().is_empty() && reasoning.is_none() && tool_calls.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(ModelTurn {
        text,
        reasoning,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(value: Value) -> ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_wire_messages_with_tool_round() {
        let messages = vec![
            Message::user("What is 2+2?"),
            Message::assistant_with_tool_uses(
                "",
                vec![("call_1".to_string(), "calculate".to_string(), json!({"expression": "2+2"}))],
            ),
            Message::tool_result("call_1", json!({"result": 4}), false),
        ];
        let wire = serde_json::to_value(to_wire_messages(Some("Be brief."), &messages)).unwrap();
        assert_eq!(wire.as_array().unwrap().len(), 4);
        assert_eq!(wire[0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(wire[1]["content"], "What is 2+2?");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "calculate");
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            "{\"expression\":\"2+2\"}"
        );
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
        assert_eq!(wire[3]["content"], "{\"result\":4}");
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let messages = vec![Message::user("hi")];
        let request = ModelRequest {
            system: None,
            messages: &messages,
            tools: &[],
        };
        let settings = InferenceSettings {
            temperature: None,
            max_tokens: Some(256),
        };
        let body = serde_json::to_value(build_request_body("deepseek-chat", &settings, request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let response = completion(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "reasoning_content": "Need arithmetic.",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "calculate", "arguments": "{\"expression\": \"2+2\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }));
        let usage = response.usage.unwrap();
        assert_eq!((usage.prompt_tokens, usage.completion_tokens), (10, 5));

        let turn = parse_response(response).unwrap();
        assert_eq!(turn.text, "");
        assert_eq!(turn.reasoning.as_deref(), Some("Need arithmetic."));
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call_9");
        assert_eq!(turn.tool_calls[0].arguments, json!({"expression": "2+2"}));
    }

    #[test]
    fn test_parse_malformed_arguments_kept_as_string() {
        let response = completion(json!({
            "choices": [{"message": {"tool_calls": [{
                "function": {"name": "calculate", "arguments": "{not json"}
            }]}}]
        }));
        let turn = parse_response(response).unwrap();
        assert_eq!(turn.tool_calls[0].arguments, json!("{not json"));
        assert!(turn.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_parse_object_arguments_and_null_tool_calls() {
        let turn = parse_response(completion(json!({
            "choices": [{"message": {"tool_calls": [{
                "id": "c1",
                "function": {"name": "echo", "arguments": {"text": "hi"}}
            }]}}]
        })))
        .unwrap();
        assert_eq!(turn.tool_calls[0].arguments, json!({"text": "hi"}));

        let turn = parse_response(completion(json!({
            "choices": [{"message": {"content": "plain", "tool_calls": null}}]
        })))
        .unwrap();
        assert_eq!(turn.text, "plain");
        assert!(!turn.has_tool_calls());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_response(completion(json!({"choices": []}))),
            Err(LlmError::Decode(_))
        ));
        assert!(matches!(
            parse_response(completion(json!({"choices": [{"message": {"content": ""}}]}))),
            Err(LlmError::EmptyResponse)
        ));
    }
}
