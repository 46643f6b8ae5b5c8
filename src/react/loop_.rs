//! 编排主循环
//!
//! AWAITING_MODEL -> (TOOL_CALLS_REQUESTED | FINAL_ANSWER_READY) -> {AWAITING_MODEL | DONE}，
//! 步数预算耗尽时进入 STEP_LIMIT_REACHED 并返回已有的最佳回答。
//!
//! - 每轮请求工具的模型输出记为一步；模型直接回答且此前没有任何步骤时，也记为一步
//! - 同一轮的多个工具按模型给出的顺序依次执行，不并发
//! - 工具失败（含未知工具）写入 `{"error": ...}` 结果继续循环；模型传输错误直接上抛
//! - 可选 event_tx：推送 StepStarted / Thinking / ToolCall / ToolResult / FinalAnswer
//! - 可选实时模式：每步结束后把推理快照写入 SessionStore

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, LoopState, RunStatus};
use crate::memory::Message;
use crate::react::{AgentEvent, Planner};
use crate::reasoning::{summarize_result, ReasoningRecorder};
use crate::session::SessionStore;
use crate::tools::ToolExecutor;

/// 步数耗尽且模型从未给出可见文字时的回答
pub const NO_CONCLUSION_RESPONSE: &str =
    "No conclusion was reached within the allowed number of steps.";

/// 实时模式的写入目标
#[derive(Clone, Copy)]
pub struct RealtimeSink<'a> {
    pub store: &'a SessionStore,
    pub session_id: &'a str,
}

/// 一次循环的结果
#[derive(Debug)]
pub struct LoopOutcome {
    pub status: RunStatus,
    pub final_thinking: String,
    pub final_response: String,
    /// 含本次 run 新增消息的完整对话
    pub messages: Vec<Message>,
}

/// 编排循环：Planner + 工具执行器 + 步数预算，外加可选的事件通道与实时写入
pub struct OrchestrationLoop<'a> {
    planner: &'a Planner,
    executor: &'a ToolExecutor,
    max_steps: usize,
    event_tx: Option<&'a UnboundedSender<AgentEvent>>,
    realtime: Option<RealtimeSink<'a>>,
}

fn send_event(tx: &Option<&UnboundedSender<AgentEvent>>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

impl<'a> OrchestrationLoop<'a> {
    pub fn new(planner: &'a Planner, executor: &'a ToolExecutor, max_steps: usize) -> Self {
        Self {
            planner,
            executor,
            max_steps,
            event_tx: None,
            realtime: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_realtime(mut self, sink: RealtimeSink<'a>) -> Self {
        self.realtime = Some(sink);
        self
    }

    fn transition(&self, from: LoopState, to: LoopState) -> LoopState {
        debug_assert!(!from.is_terminal(), "transition out of terminal state {}", from);
        tracing::debug!(from = %from, to = %to, "Loop state transition");
        to
    }

    /// 运行到 DONE 或 STEP_LIMIT_REACHED；步骤写入 recorder，finalize 由调用方完成
    pub async fn run(
        &self,
        query: &str,
        prior: Vec<Message>,
        recorder: &mut ReasoningRecorder,
    ) -> Result<LoopOutcome, AgentError> {
        let mut messages = prior;
        messages.push(Message::user(query));
        let specs = self.executor.specs();
        let mut state = LoopState::AwaitingModel;
        // 模型最近一次随工具调用给出的可见文字，步数耗尽时作为回答
        let mut last_text = String::new();

        loop {
            let step = recorder.step_count() + 1;
            send_event(
                &self.event_tx,
                AgentEvent::StepStarted {
                    step,
                    max_steps: self.max_steps,
                },
            );

            let turn = self.planner.plan(&messages, &specs).await?;
            if !turn.thinking.is_empty() {
                send_event(
                    &self.event_tx,
                    AgentEvent::Thinking {
                        text: turn.thinking.clone(),
                    },
                );
            }

            if !turn.has_tool_calls() {
                let state = self.transition(state, LoopState::FinalAnswerReady);
                if recorder.step_count() == 0 {
                    recorder.add_step(turn.thinking.clone(), Vec::new());
                }
                let response = turn.final_response();
                messages.push(Message::assistant(response.clone()));
                send_event(
                    &self.event_tx,
                    AgentEvent::FinalAnswer {
                        text: response.clone(),
                    },
                );
                self.transition(state, RunStatus::Done.into());
                tracing::info!(steps = recorder.step_count(), "Run finished with final answer");
                return Ok(LoopOutcome {
                    status: RunStatus::Done,
                    final_thinking: turn.thinking,
                    final_response: response,
                    messages,
                });
            }

            state = self.transition(state, LoopState::ToolCallsRequested);
            if !turn.response.is_empty() {
                last_text = turn.response.clone();
            }
            messages.push(Message::assistant_with_tool_uses(
                turn.response.clone(),
                turn.tool_calls
                    .iter()
                    .map(|c| (c.id.clone(), c.name.clone(), c.arguments.clone())),
            ));

            let mut invocations = Vec::with_capacity(turn.tool_calls.len());
            for call in &turn.tool_calls {
                send_event(
                    &self.event_tx,
                    AgentEvent::ToolCall {
                        tool: call.name.clone(),
                        args: call.arguments.clone(),
                    },
                );
                let invocation = self.executor.execute(&call.name, call.arguments.clone()).await;
                send_event(
                    &self.event_tx,
                    AgentEvent::ToolResult {
                        tool: call.name.clone(),
                        ok: !invocation.is_error(),
                        preview: summarize_result(&invocation.result),
                    },
                );
                messages.push(Message::tool_result(
                    call.id.clone(),
                    invocation.result.clone(),
                    invocation.is_error(),
                ));
                invocations.push(invocation);
            }

            let step_number = recorder.add_step(turn.step_thinking(), invocations).step_number;
            self.flush_realtime(recorder, step_number).await?;

            if recorder.step_count() >= self.max_steps {
                self.transition(state, RunStatus::StepLimitReached.into());
                tracing::warn!(max_steps = self.max_steps, "Step limit reached, returning partial answer");
                send_event(
                    &self.event_tx,
                    AgentEvent::StepLimitReached {
                        max_steps: self.max_steps,
                    },
                );
                let response = if last_text.is_empty() {
                    NO_CONCLUSION_RESPONSE.to_string()
                } else {
                    last_text
                };
                messages.push(Message::assistant(response.clone()));
                return Ok(LoopOutcome {
                    status: RunStatus::StepLimitReached,
                    final_thinking: turn.thinking,
                    final_response: response,
                    messages,
                });
            }

            state = self.transition(state, LoopState::AwaitingModel);
        }
    }

    async fn flush_realtime(
        &self,
        recorder: &mut ReasoningRecorder,
        step: usize,
    ) -> Result<(), AgentError> {
        if let Some(sink) = self.realtime {
            sink.store.append_reasoning(sink.session_id, recorder).await?;
            send_event(&self.event_tx, AgentEvent::ReasoningSaved { step });
        }
        Ok(())
    }
}
