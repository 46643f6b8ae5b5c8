//! 编排层：Planner、编排主循环、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::AgentEvent;
pub use loop_::{LoopOutcome, OrchestrationLoop, RealtimeSink, NO_CONCLUSION_RESPONSE};
pub use planner::{split_thinking, PlannedTurn, Planner};
