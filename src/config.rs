//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PLANLOOM__*` 覆盖（双下划线表示嵌套，如 `PLANLOOM__CHECKPOINT__BACKEND=memory`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::engine::default_affirmative_tokens;
use crate::core::{EscalationPolicy, NegotiationPolicy};
use crate::tools::RecordsToolConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// [engine] 段：重试升级档位、肯定词、大结果协商
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(flatten)]
    pub escalation: EscalationPolicy,
    /// 闸门处表示「照计划继续」的输入（不区分大小写）
    #[serde(default = "default_affirmative_tokens")]
    pub affirmative_tokens: Vec<String>,
    #[serde(default)]
    pub negotiation: NegotiationPolicy,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            escalation: EscalationPolicy::default(),
            affirmative_tokens: default_affirmative_tokens(),
            negotiation: NegotiationPolicy::default(),
        }
    }
}

/// 检查点后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Sqlite,
    Memory,
}

/// [checkpoint] 段
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSection {
    #[serde(default)]
    pub backend: CheckpointBackend,
    /// SQLite 数据库文件
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data/checkpoints.db")
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            path: default_checkpoint_path(),
        }
    }
}

/// [tools] 段：单次调用超时、soft error 标记、静态记录集工具
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_error_markers")]
    pub error_markers: Vec<String>,
    #[serde(default)]
    pub records: Vec<RecordsToolConfig>,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_error_markers() -> Vec<String> {
    vec!["Error".into(), "failed".into()]
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            error_markers: default_error_markers(),
            records: Vec::new(),
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / mock；openai 在没有 API Key 时退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 PLANLOOM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PLANLOOM__*（双下划线表示嵌套键）
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
            tracing::warn!("Config file {} not found, skipping", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PLANLOOM")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.escalation.ask_human_at, 3);
        assert_eq!(cfg.engine.escalation.max_retries, 5);
        assert_eq!(cfg.engine.negotiation.cell_limit, 50);
        assert_eq!(cfg.checkpoint.backend, CheckpointBackend::Sqlite);
        assert_eq!(cfg.tools.error_markers, vec!["Error", "failed"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
ask_human_at = 2
max_retries = 4

[engine.negotiation]
enabled = false

[checkpoint]
backend = "memory"

[[tools.records]]
name = "get_customers"
rows = [{{ customer = "acme", region = "eu" }}]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.escalation.ask_human_at, 2);
        assert_eq!(cfg.engine.escalation.max_retries, 4);
        assert!(!cfg.engine.negotiation.enabled);
        assert_eq!(cfg.checkpoint.backend, CheckpointBackend::Memory);
        assert!(cfg.tools.records.iter().any(|r| r.name == "get_customers"));
    }
}
