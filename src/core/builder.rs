//! Agent 构建器：统一的 Agent 初始化逻辑
//!
//! 工具由调用方在构建前显式注册；参数在 build 时一次性校验（步数预算为 0、实时模式却没有会话存储等），
//! 运行前即报 ConfigError。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::agent::Agent;
use crate::config::{AppConfig, LlmSection, SessionSection};
use crate::core::AgentError;
use crate::llm::{
    create_deepseek_client, InferenceSettings, LlmClient, MockLlmClient, OpenAiClient,
};
use crate::react::{AgentEvent, Planner};
use crate::reasoning::DEFAULT_MAX_TRACE_BYTES;
use crate::session::{
    InMemoryBackend, SessionStore, SqliteBackend, StoreBackend, DEFAULT_TTL_SECS,
};
use crate::tools::{Tool, ToolExecutor, ToolRegistry};

/// 默认步数预算
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Agent 构建器
pub struct AgentBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    max_steps: usize,
    tool_timeout: Option<Duration>,
    session_backend: Option<Arc<dyn StoreBackend>>,
    session_ttl_secs: u64,
    real_time_reasoning: bool,
    max_reasoning_bytes: usize,
    event_tx: Option<UnboundedSender<AgentEvent>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            tools: ToolRegistry::new(),
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            tool_timeout: None,
            session_backend: None,
            session_ttl_secs: DEFAULT_TTL_SECS,
            real_time_reasoning: false,
            max_reasoning_bytes: DEFAULT_MAX_TRACE_BYTES,
            event_tx: None,
        }
    }

    /// 按配置填充 LLM、会话后端与各项参数；工具仍需单独注册
    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        let mut builder = Self::new()
            .with_llm(create_llm_from_config(&config.llm)?)
            .with_max_steps(config.agent.max_steps)
            .with_tool_timeout(config.agent.tool_timeout_secs.map(Duration::from_secs))
            .with_session_ttl(config.session.ttl_secs)
            .with_real_time_reasoning(config.session.real_time_reasoning)
            .with_max_reasoning_bytes(config.session.max_reasoning_bytes);
        if let Some(prompt) = &config.agent.system_prompt {
            builder = builder.with_system_prompt(prompt.clone());
        }
        if config.session.enabled {
            builder = builder.with_session_backend(create_backend_from_config(&config.session)?);
        }
        Ok(builder)
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self.tools.register_arc(tool);
        }
        self
    }

    /// 设置系统提示词
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// 单次工具调用超时；None 表示不限时
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_session_backend(mut self, backend: Arc<dyn StoreBackend>) -> Self {
        self.session_backend = Some(backend);
        self
    }

    pub fn with_session_ttl(mut self, ttl_secs: u64) -> Self {
        self.session_ttl_secs = ttl_secs;
        self
    }

    /// 每步结束即写入推理快照；需要会话存储
    pub fn with_real_time_reasoning(mut self, enabled: bool) -> Self {
        self.real_time_reasoning = enabled;
        self
    }

    pub fn with_max_reasoning_bytes(mut self, max_bytes: usize) -> Self {
        self.max_reasoning_bytes = max_bytes;
        self
    }

    /// 过程事件推送通道
    pub fn with_event_tx(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 校验参数并构建 Agent；有会话后端时在此确保表存在
    pub async fn build(self) -> Result<Agent, AgentError> {
        if self.max_steps == 0 {
            return Err(AgentError::ConfigError(
                "max_steps must be greater than 0".to_string(),
            ));
        }
        if self.max_reasoning_bytes == 0 {
            return Err(AgentError::ConfigError(
                "max_reasoning_bytes must be greater than 0".to_string(),
            ));
        }
        if self.tool_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AgentError::ConfigError(
                "tool timeout must be greater than 0".to_string(),
            ));
        }
        if self.real_time_reasoning && self.session_backend.is_none() {
            return Err(AgentError::ConfigError(
                "real-time reasoning requires a session store".to_string(),
            ));
        }
        let llm = self
            .llm
            .ok_or_else(|| AgentError::ConfigError("no LLM client configured".to_string()))?;

        let store = match self.session_backend {
            Some(backend) => Some(Arc::new(
                SessionStore::open(backend, self.session_ttl_secs).await?,
            )),
            None => None,
        };

        tracing::info!(
            model = llm.model_id(),
            tools = self.tools.len(),
            max_steps = self.max_steps,
            session_store = store.is_some(),
            real_time_reasoning = self.real_time_reasoning,
            "Agent built"
        );

        Ok(Agent::from_parts(
            Planner::new(llm, self.system_prompt),
            ToolExecutor::new(self.tools, self.tool_timeout),
            self.max_steps,
            store,
            self.real_time_reasoning,
            self.max_reasoning_bytes,
            self.event_tx,
        ))
    }
}

/// 按 provider 与环境中的 API Key 选择 LLM 后端；都没有时回退到 Mock
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Ok(Arc::new(MockLlmClient::new()));
    }

    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    let settings = InferenceSettings {
        temperature: cfg.temperature,
        max_tokens: cfg.max_tokens,
    };
    let timeout = Duration::from_secs(cfg.request_timeout_secs);

    let client = if use_deepseek && provider != "openai" {
        tracing::info!("Using DeepSeek LLM ({})", cfg.model);
        create_deepseek_client(cfg.base_url.as_deref(), Some(&cfg.model))
    } else if use_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.model);
        OpenAiClient::new(
            cfg.base_url.as_deref(),
            &cfg.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        return Ok(Arc::new(MockLlmClient::new()));
    };

    let client = client
        .with_settings(settings)
        .with_request_timeout(timeout)
        .map_err(AgentError::Transport)?;
    Ok(Arc::new(client))
}

/// 按 [session] 段创建存储后端
pub fn create_backend_from_config(
    cfg: &SessionSection,
) -> Result<Arc<dyn StoreBackend>, AgentError> {
    match cfg.backend.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryBackend::with_max_item_bytes(
            cfg.max_item_bytes,
        ))),
        "sqlite" => {
            let backend = SqliteBackend::open(&cfg.db_path, &cfg.table_name)?
                .with_max_item_bytes(cfg.max_item_bytes);
            Ok(Arc::new(backend))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown session backend '{}', expected sqlite or memory",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    fn mock() -> Arc<dyn LlmClient> {
        Arc::new(MockLlmClient::new())
    }

    #[tokio::test]
    async fn test_zero_max_steps_rejected() {
        let err = AgentBuilder::new()
            .with_llm(mock())
            .with_max_steps(0)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_real_time_requires_store() {
        let err = AgentBuilder::new()
            .with_llm(mock())
            .with_real_time_reasoning(true)
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("session store"));
    }

    #[tokio::test]
    async fn test_missing_llm_rejected() {
        assert!(matches!(
            AgentBuilder::new().build().await,
            Err(AgentError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_tool_timeout_rejected() {
        let err = AgentBuilder::new()
            .with_llm(mock())
            .with_tool_timeout(Some(Duration::ZERO))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_from_config_with_memory_backend() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.session.enabled = true;
        cfg.session.backend = "memory".to_string();
        cfg.session.real_time_reasoning = true;
        cfg.agent.max_steps = 3;

        let agent = AgentBuilder::from_config(&cfg)
            .unwrap()
            .with_tool(EchoTool)
            .build()
            .await
            .unwrap();
        assert_eq!(agent.max_steps(), 3);
        assert!(agent.has_session_store());
        assert_eq!(agent.tool_names(), vec!["echo"]);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let cfg = SessionSection {
            backend: "dynamo".to_string(),
            ..SessionSection::default()
        };
        assert!(matches!(
            create_backend_from_config(&cfg),
            Err(AgentError::ConfigError(_))
        ));
    }
}
