//! 工具执行器
//!
//! 持有 ToolRegistry 与可选的单次调用超时。execute 永不失败：未知工具、参数非法、工具返回 Err、
//! panic、超时都被转为 `{"error": ...}` 的 ToolInvocation，单个工具失败不会中止整个会话。
//! 每次调用输出一行结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::ToolError;
use crate::reasoning::ToolInvocation;
use crate::tools::{Tool, ToolRegistry, ToolSpec};

/// 审计日志里参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具执行器：按名查找并执行，结果统一为 ToolInvocation
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    /// timeout 为 None 时不设上限（工具阻塞多久，本轮就等多久）
    pub fn new(registry: ToolRegistry, timeout: Option<Duration>) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行一次工具调用；args 应为 JSON object（null 视为空参数）
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolInvocation {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let (inputs, outcome) = match args {
            Value::Object(map) => {
                let outcome = self.run(tool_name, map.clone()).await;
                (map, outcome)
            }
            Value::Null => (Map::new(), self.run(tool_name, Map::new()).await),
            other => {
                let mut raw = Map::new();
                raw.insert("_raw".to_string(), other);
                let err = ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: "arguments must be a JSON object".to_string(),
                };
                (raw, Err(err))
            }
        };

        let outcome_label = match &outcome {
            Ok(_) => "ok",
            Err(ToolError::Timeout { .. }) => "timeout",
            Err(ToolError::UnknownTool { .. }) => "unknown_tool",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome.is_ok(),
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match outcome {
            Ok(value) => ToolInvocation::success(tool_name, inputs, value),
            Err(e) => ToolInvocation::failure(tool_name, inputs, e.to_string()),
        }
    }

    async fn run(&self, tool_name: &str, args: Map<String, Value>) -> Result<Value, ToolError> {
        let tool: Arc<dyn Tool> = self.registry.get(tool_name).ok_or_else(|| {
            ToolError::UnknownTool {
                name: tool_name.to_string(),
                available: self.registry.tool_names().join(", "),
            }
        })?;

        // 放进独立任务执行：工具 panic 变成 JoinError，被当作普通失败记录
        let handle = tokio::spawn(async move { tool.execute(args).await });
        let joined = match self.timeout {
            Some(limit) => {
                let abort = handle.abort_handle();
                match timeout(limit, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        abort.abort();
                        return Err(ToolError::Timeout {
                            tool: tool_name.to_string(),
                            after: limit,
                        });
                    }
                }
            }
            None => handle.await,
        };

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ToolError::Failed {
                tool: tool_name.to_string(),
                message,
            }),
            Err(join_err) => Err(ToolError::Failed {
                tool: tool_name.to_string(),
                message: if join_err.is_panic() {
                    "tool panicked".to_string()
                } else {
                    join_err.to_string()
                },
            }),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
