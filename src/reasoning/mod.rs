//! 推理轨迹：数据模型与记录器

pub mod recorder;
pub mod trace;

pub use recorder::{
    append_truncation_warning, deserialize_trace, serialize_trace, summarize_result,
    ReasoningRecorder, SizeLimitExceeded, TraceError, DEFAULT_MAX_TRACE_BYTES, TRUNCATION_WARNING,
};
pub use trace::{InvocationStatus, ReasoningStep, ReasoningTrace, ToolInvocation};
