//! 编排循环状态
//!
//! AWAITING_MODEL -> (TOOL_CALLS_REQUESTED | FINAL_ANSWER_READY) -> {AWAITING_MODEL | DONE}；
//! 步数预算耗尽时进入 STEP_LIMIT_REACHED。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 循环所处阶段（日志与事件用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingModel,
    ToolCallsRequested,
    FinalAnswerReady,
    Done,
    StepLimitReached,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Done | LoopState::StepLimitReached)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::AwaitingModel => "AWAITING_MODEL",
            LoopState::ToolCallsRequested => "TOOL_CALLS_REQUESTED",
            LoopState::FinalAnswerReady => "FINAL_ANSWER_READY",
            LoopState::Done => "DONE",
            LoopState::StepLimitReached => "STEP_LIMIT_REACHED",
        };
        f.write_str(s)
    }
}

/// 一次 run 的终止状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 模型给出了最终回答
    Done,
    /// 步数预算耗尽，返回的是目前最好的部分回答
    StepLimitReached,
}

impl From<RunStatus> for LoopState {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Done => LoopState::Done,
            RunStatus::StepLimitReached => LoopState::StepLimitReached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LoopState::Done.is_terminal());
        assert!(LoopState::StepLimitReached.is_terminal());
        assert!(!LoopState::AwaitingModel.is_terminal());
        assert!(!LoopState::ToolCallsRequested.is_terminal());
    }

    #[test]
    fn test_display_matches_state_names() {
        assert_eq!(LoopState::StepLimitReached.to_string(), "STEP_LIMIT_REACHED");
        assert_eq!(LoopState::from(RunStatus::Done), LoopState::Done);
    }

    #[test]
    fn test_run_status_maps_to_terminal_state() {
        for status in [RunStatus::Done, RunStatus::StepLimitReached] {
            assert!(LoopState::from(status).is_terminal());
        }
        assert_eq!(
            LoopState::from(RunStatus::StepLimitReached),
            LoopState::StepLimitReached
        );
    }
}
