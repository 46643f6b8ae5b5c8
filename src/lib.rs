//! minagent - 轻量 Agent 运行时
//!
//! 模块划分：
//! - **agent**: Agent 门面（run / get_reasoning / get_reasoning_history / add_tools）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、循环状态、AgentBuilder
//! - **llm**: 模型传输抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息模型（user / assistant / tool）
//! - **observability**: 日志初始化
//! - **react**: 编排主循环（模型 <-> 工具多步调用）、Planner、过程事件
//! - **reasoning**: 推理轨迹数据模型与 ReasoningRecorder（含大小上限截断）
//! - **session**: 会话存储（append-only 记录、TTL、内存 / SQLite 后端）
//! - **tools**: 工具 trait、注册表、参数 schema、执行器与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod reasoning;
pub mod session;
pub mod tools;

pub use agent::Agent;
pub use core::{AgentBuilder, AgentError};
pub use reasoning::{ReasoningStep, ReasoningTrace, ToolInvocation};
