//! 核心层：错误类型、循环状态、Agent 构建器

pub mod builder;
pub mod error;
pub mod state;

pub use builder::{
    create_backend_from_config, create_llm_from_config, AgentBuilder, DEFAULT_MAX_STEPS,
};
pub use error::{AgentError, ToolError};
pub use state::{LoopState, RunStatus};
