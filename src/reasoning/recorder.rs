//! ReasoningRecorder：累积推理步骤，序列化时执行大小上限
//!
//! 添加内容时不做任何大小预检。序列化是一个返回 `Result` 的步骤：超过上限（来自记录器自身的上限，
//! 或存储后端的单条记录上限）时由调用方调用 `truncate_once` 逐级裁剪后重试：
//! 1. 从最早的步骤开始截短 thinking
//! 2. 从最早的步骤开始清空工具入参与结果（保留步号、工具名与状态）
//! 3. 截短 final_thinking
//! 4. 清空所有 thinking
//! 5. 截短 query
//!
//! final_response 从不裁剪：调用方拿到的回答必须完整可用。
//! 第一次裁剪（或裁无可裁）即设置 `exceeded_size_limit` 并在 final_response 末尾追加固定警告。

use chrono::Utc;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::reasoning::trace::{ReasoningStep, ReasoningTrace, ToolInvocation};

/// 截断后追加到 final_response 的提示
pub const TRUNCATION_WARNING: &str =
    "[Note: the reasoning trace exceeded the storage size limit and was truncated.]";

/// 默认序列化上限，略低于常见托管 KV 存储 400KB 的单条记录上限
pub const DEFAULT_MAX_TRACE_BYTES: usize = 380 * 1024;

/// 截短后保留的字符数
const KEEP_CHARS: usize = 200;

const TRUNCATED_MARKER: &str = "... [truncated]";

/// 序列化结果超过上限
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Serialized reasoning trace is {size} bytes, exceeding the limit of {limit} bytes")]
pub struct SizeLimitExceeded {
    pub size: usize,
    pub limit: usize,
}

/// 轨迹序列化失败：超过大小上限，或 JSON 编码本身出错
#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    SizeLimit(#[from] SizeLimitExceeded),
    #[error("Failed to serialize reasoning trace: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn serialize_trace(trace: &ReasoningTrace) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(trace)
}

pub fn deserialize_trace(bytes: &[u8]) -> Result<ReasoningTrace, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// 单次 run 的推理记录器
#[derive(Debug, Clone)]
pub struct ReasoningRecorder {
    trace: ReasoningTrace,
    max_bytes: usize,
}

impl ReasoningRecorder {
    pub fn start(session_id: Option<&str>, query: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            trace: ReasoningTrace::new(session_id, query),
            max_bytes,
        }
    }

    /// 追加一步；步号自动递增
    pub fn add_step(
        &mut self,
        thinking: impl Into<String>,
        tools: Vec<ToolInvocation>,
    ) -> &ReasoningStep {
        let step = ReasoningStep {
            step_number: self.trace.steps.len() + 1,
            timestamp: Utc::now(),
            thinking: thinking.into(),
            tools,
        };
        self.trace.steps.push(step);
        self.trace.total_steps = self.trace.steps.len();
        &self.trace.steps[self.trace.steps.len() - 1]
    }

    pub fn step_count(&self) -> usize {
        self.trace.steps.len()
    }

    pub fn finalize(
        &mut self,
        final_thinking: impl Into<String>,
        final_response: impl Into<String>,
        step_limit_reached: bool,
    ) {
        self.trace.final_thinking = final_thinking.into();
        self.trace.final_response = final_response.into();
        self.trace.step_limit_reached = step_limit_reached;
        self.trace.total_steps = self.trace.steps.len();
        self.trace.end_time = Some(Utc::now());
        if self.trace.exceeded_size_limit {
            append_truncation_warning(&mut self.trace.final_response);
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.trace.is_complete()
    }

    pub fn trace(&self) -> &ReasoningTrace {
        &self.trace
    }

    pub fn into_trace(self) -> ReasoningTrace {
        self.trace
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// 序列化当前轨迹；超过记录器上限时返回 SizeLimit
    pub fn serialize(&self) -> Result<Vec<u8>, TraceError> {
        let bytes = serialize_trace(&self.trace)?;
        if bytes.len() > self.max_bytes {
            return Err(SizeLimitExceeded {
                size: bytes.len(),
                limit: self.max_bytes,
            }
            .into());
        }
        Ok(bytes)
    }

    /// 序列化；超限则逐级裁剪直到满足记录器上限，裁无可裁时返回最后一次的 SizeLimit
    pub fn serialize_fitting(&mut self) -> Result<Vec<u8>, TraceError> {
        loop {
            match self.serialize() {
                Err(TraceError::SizeLimit(e)) => {
                    if !self.truncate_once() {
                        self.mark_exceeded();
                        return Err(e.into());
                    }
                }
                other => return other,
            }
        }
    }

    /// 标记轨迹超限并追加警告（幂等）
    pub fn mark_exceeded(&mut self) {
        if !self.trace.exceeded_size_limit {
            tracing::warn!(
                steps = self.trace.steps.len(),
                limit = self.max_bytes,
                "Reasoning trace exceeds size limit, truncating"
            );
        }
        self.trace.exceeded_size_limit = true;
        append_truncation_warning(&mut self.trace.final_response);
    }

    /// 执行一级裁剪；已无可裁剪内容时返回 false
    pub fn truncate_once(&mut self) -> bool {
        let applied = self.clip_step_thinking()
            || self.strip_step_payload()
            || clip_in_place(&mut self.trace.final_thinking)
            || self.drop_thinking()
            || clip_in_place(&mut self.trace.query);
        if applied {
            self.mark_exceeded();
        }
        applied
    }

    fn clip_step_thinking(&mut self) -> bool {
        self.trace
            .steps
            .iter_mut()
            .any(|step| clip_in_place(&mut step.thinking))
    }

    fn strip_step_payload(&mut self) -> bool {
        let truncated = json!({ "truncated": true });
        let step = self.trace.steps.iter_mut().find(|step| {
            step.tools
                .iter()
                .any(|t| !t.inputs.is_empty() || t.result != truncated)
        });
        match step {
            Some(step) => {
                for tool in &mut step.tools {
                    tool.inputs = Map::new();
                    tool.result = truncated.clone();
                }
                true
            }
            None => false,
        }
    }

    fn drop_thinking(&mut self) -> bool {
        let mut changed = !self.trace.final_thinking.is_empty();
        self.trace.final_thinking.clear();
        for step in &mut self.trace.steps {
            changed |= !step.thinking.is_empty();
            step.thinking.clear();
        }
        changed
    }
}

/// 在回答末尾追加截断警告；已带警告时不重复追加
pub fn append_truncation_warning(response: &mut String) {
    if response.ends_with(TRUNCATION_WARNING) {
        return;
    }
    if !response.is_empty() {
        response.push_str("\n\n");
    }
    response.push_str(TRUNCATION_WARNING);
}

/// 超长时截为前 KEEP_CHARS 个字符加标记；已足够短则不动
fn clip_in_place(text: &mut String) -> bool {
    if text.chars().count() <= KEEP_CHARS + TRUNCATED_MARKER.len() {
        return false;
    }
    let mut clipped: String = text.chars().take(KEEP_CHARS).collect();
    clipped.push_str(TRUNCATED_MARKER);
    *text = clipped;
    true
}

/// 供调试输出的简短摘要
pub fn summarize_result(value: &Value) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if s.chars().count() > 80 {
        format!("{}...", s.chars().take(80).collect::<String>())
    } else {
        s
    }
}
