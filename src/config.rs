//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MINAGENT__*` 覆盖（双下划线表示嵌套，如 `MINAGENT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::reasoning::DEFAULT_MAX_TRACE_BYTES;
use crate::session::{DEFAULT_MAX_ITEM_BYTES, DEFAULT_TTL_SECS};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub session: SessionSection,
}

/// [agent] 段：系统提示词、步数预算、展示与日志
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub system_prompt: Option<String>,
    /// 单次 run 最多执行的工具步数，必须大于 0
    pub max_steps: usize,
    /// 在终端展示思考与工具调用过程
    pub show_reasoning: bool,
    /// 默认日志级别，RUST_LOG 优先
    pub log_level: String,
    /// 单次工具调用超时（秒）；不设置时工具阻塞多久就等多久
    pub tool_timeout_secs: Option<u64>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_steps: 5,
            show_reasoning: false,
            log_level: "info".to_string(),
            tool_timeout_secs: None,
        }
    }
}

/// [llm] 段：后端选择、模型与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// 单次模型请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            temperature: None,
            max_tokens: None,
            request_timeout_secs: crate::llm::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// [session] 段：会话持久化
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 是否启用会话存储
    pub enabled: bool,
    /// 存储后端：sqlite / memory
    pub backend: String,
    pub db_path: PathBuf,
    pub table_name: String,
    /// 记录存活时间（秒）
    pub ttl_secs: u64,
    /// 每步结束即写入推理快照
    pub real_time_reasoning: bool,
    /// 后端单条记录上限（字节）
    pub max_item_bytes: usize,
    /// 推理轨迹序列化上限（字节）
    pub max_reasoning_bytes: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "sqlite".to_string(),
            db_path: PathBuf::from("data/sessions.db"),
            table_name: "minimalagent-session-table".to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            real_time_reasoning: false,
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            max_reasoning_bytes: DEFAULT_MAX_TRACE_BYTES,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MINAGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MINAGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MINAGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_steps, 5);
        assert!(cfg.agent.tool_timeout_secs.is_none());
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.session.ttl_secs, 3600);
        assert_eq!(cfg.session.table_name, "minimalagent-session-table");
        assert!(!cfg.session.real_time_reasoning);
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nmodel = \"gpt-4o-mini\"\nprovider = \"openai\"\n\n[session]\nenabled = true\nbackend = \"memory\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.provider, "openai");
        assert!(cfg.session.enabled);
        assert_eq!(cfg.session.backend, "memory");
        // 未出现的键保持默认值
        assert_eq!(cfg.agent.max_steps, 5);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("MINAGENT__SESSION__TTL_SECS", "120");
        let cfg = load_config(None);
        std::env::remove_var("MINAGENT__SESSION__TTL_SECS");
        assert_eq!(cfg.unwrap().session.ttl_secs, 120);
    }
}
