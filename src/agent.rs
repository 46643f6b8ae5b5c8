//! Agent 门面
//!
//! 把 Planner、工具执行器、SessionStore 与 ReasoningRecorder 组装起来，对外提供：
//! run（单次查询）、get_reasoning / get_reasoning_history（读取推理记录）、add_tools（注册工具）。
//!
//! run 只需 `&self`，同一个 Agent 可被多个任务并发调用；同一会话的并发 run 之间不加锁，"最新"以后写者为准。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentBuilder, AgentError, RunStatus};
use crate::react::{AgentEvent, OrchestrationLoop, Planner, RealtimeSink};
use crate::reasoning::{append_truncation_warning, ReasoningRecorder, ReasoningTrace};
use crate::session::{validate_session_id, SessionStore};
use crate::tools::{Tool, ToolExecutor};

/// Agent
pub struct Agent {
    planner: Planner,
    executor: ToolExecutor,
    max_steps: usize,
    store: Option<Arc<SessionStore>>,
    real_time_reasoning: bool,
    max_reasoning_bytes: usize,
    event_tx: Option<UnboundedSender<AgentEvent>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("max_steps", &self.max_steps)
            .field("has_store", &self.store.is_some())
            .field("real_time_reasoning", &self.real_time_reasoning)
            .field("max_reasoning_bytes", &self.max_reasoning_bytes)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub(crate) fn from_parts(
        planner: Planner,
        executor: ToolExecutor,
        max_steps: usize,
        store: Option<Arc<SessionStore>>,
        real_time_reasoning: bool,
        max_reasoning_bytes: usize,
        event_tx: Option<UnboundedSender<AgentEvent>>,
    ) -> Self {
        Self {
            planner,
            executor,
            max_steps,
            store,
            real_time_reasoning,
            max_reasoning_bytes,
            event_tx,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn has_session_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }

    /// 注册工具；同名工具会被替换
    pub fn add_tool(&mut self, tool: impl Tool + 'static) {
        self.executor.registry_mut().register(tool);
    }

    pub fn add_tools(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.executor.registry_mut().register_arc(tool);
        }
    }

    fn checked_session_id<'s>(&self, session_id: Option<&'s str>) -> Result<Option<&'s str>, AgentError> {
        match session_id {
            Some(id) if !validate_session_id(id) => Err(AgentError::InvalidSessionId(format!(
                "'{}' (expected 1-128 characters from [A-Za-z0-9_-])",
                id
            ))),
            other => Ok(other),
        }
    }

    /// 执行一次查询，返回 (回答文本, 推理轨迹)
    ///
    /// 给定 session_id 且配置了会话存储时：先加载该会话最新的消息作为上下文，结束后写入新的消息快照与推理轨迹。
    /// 轨迹超过大小上限时被裁剪；回答文本始终完整，末尾附带截断提示。
    pub async fn run(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<(String, ReasoningTrace), AgentError> {
        let session_id = self.checked_session_id(session_id)?;
        let persist = match (session_id, &self.store) {
            (Some(id), Some(store)) => Some((id, store.as_ref())),
            (Some(id), None) => {
                tracing::warn!(session_id = id, "Session id given but no session store configured, not persisting");
                None
            }
            _ => None,
        };

        let prior = match persist {
            Some((id, store)) => store.load_latest_messages(id).await?,
            None => Vec::new(),
        };
        tracing::info!(
            session_id = session_id.unwrap_or("-"),
            prior_messages = prior.len(),
            "Running query"
        );

        let mut recorder = ReasoningRecorder::start(session_id, query, self.max_reasoning_bytes);
        let mut orchestration = OrchestrationLoop::new(&self.planner, &self.executor, self.max_steps);
        if let Some(tx) = &self.event_tx {
            orchestration = orchestration.with_event_tx(tx);
        }
        if self.real_time_reasoning {
            if let Some((id, store)) = persist {
                orchestration = orchestration.with_realtime(RealtimeSink {
                    store,
                    session_id: id,
                });
            }
        }

        let outcome = orchestration.run(query, prior, &mut recorder).await?;
        // 返回给调用方的回答取自循环本身，不受轨迹裁剪影响
        let mut response = outcome.final_response.clone();
        recorder.finalize(
            outcome.final_thinking,
            outcome.final_response,
            outcome.status == RunStatus::StepLimitReached,
        );

        match persist {
            Some((id, store)) => {
                store.append_messages(id, &outcome.messages).await?;
                store.append_reasoning(id, &mut recorder).await?;
            }
            None => {
                if let Err(e) = recorder.serialize_fitting() {
                    tracing::warn!("Reasoning trace could not be serialized within its limit: {}", e);
                }
            }
        }

        let trace = recorder.into_trace();
        if trace.exceeded_size_limit {
            append_truncation_warning(&mut response);
        }
        Ok((response, trace))
    }

    /// 会话最新的推理轨迹；会话不存在或未配置存储时返回 None
    pub async fn get_reasoning(
        &self,
        session_id: &str,
    ) -> Result<Option<ReasoningTrace>, AgentError> {
        self.checked_session_id(Some(session_id))?;
        match &self.store {
            Some(store) => Ok(store.load_latest_reasoning(session_id).await?),
            None => {
                tracing::warn!("get_reasoning called without a session store");
                Ok(None)
            }
        }
    }

    /// 会话内已完成的推理轨迹，最新在前
    pub async fn get_reasoning_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ReasoningTrace>, AgentError> {
        self.checked_session_id(Some(session_id))?;
        match &self.store {
            Some(store) => Ok(store.load_reasoning_history(session_id).await?),
            None => {
                tracing::warn!("get_reasoning_history called without a session store");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelTurn};
    use crate::session::InMemoryBackend;
    use crate::tools::{CalculateTool, EchoTool};
    use serde_json::json;

    #[tokio::test]
    async fn test_invalid_session_id_rejected_before_model_call() {
        let llm = Arc::new(MockLlmClient::new());
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .build()
            .await
            .unwrap();
        let err = agent.run("hi", Some("bad id!")).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidSessionId(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_without_store_ignores_session() {
        let llm = Arc::new(MockLlmClient::scripted([ModelTurn::text("hello")]));
        let agent = Agent::builder().with_llm(llm).build().await.unwrap();
        let (text, trace) = agent.run("hi", Some("s1")).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(trace.session_id.as_deref(), Some("s1"));
        assert!(agent.get_reasoning("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_tools_visible_to_model() {
        let llm = Arc::new(MockLlmClient::scripted([ModelTurn::text("ok")]));
        let mut agent = Agent::builder()
            .with_llm(llm.clone())
            .with_tool(EchoTool)
            .build()
            .await
            .unwrap();
        agent.add_tools([Arc::new(CalculateTool) as Arc<dyn Tool>]);
        assert_eq!(agent.tool_names(), vec!["echo", "calculate"]);

        agent.run("hi", None).await.unwrap();
        assert_eq!(llm.requests()[0].tool_names, vec!["echo", "calculate"]);
    }

    #[tokio::test]
    async fn test_session_context_carries_over() {
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::tool_call("", "c1", "calculate", json!({"expression": "6*7"})),
            ModelTurn::text("42"),
            ModelTurn::text("You asked about 6*7."),
        ]));
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .with_tool(CalculateTool)
            .with_session_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();

        agent.run("What is 6*7?", Some("s1")).await.unwrap();
        agent.run("What did I ask?", Some("s1")).await.unwrap();

        // 第二次 run 的首个请求包含第一次 run 的全部消息
        let second = &llm.requests()[2];
        assert_eq!(second.messages.len(), 5);
        assert_eq!(second.messages[0].text(), "What is 6*7?");
        assert_eq!(second.messages[4].text(), "What did I ask?");
    }
}
