//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `USC__*` 覆盖（双下划线表示嵌套，如 `USC__AGENT__K_PATHS=8`）。
//! 核心循环只接收构造时传入的 AgentConfig 值对象，内部不读取任何环境变量。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AgentError;

/// timeout_seconds 上限（一天）
pub const MAX_TIMEOUT_SECONDS: f64 = 86_400.0;
/// retry.backoff_seconds 上限（一小时）
pub const MAX_BACKOFF_SECONDS: f64 = 3_600.0;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// Judge 的仲裁方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// 必须按下标选中某个候选，原样复制其内容
    #[default]
    SelectOne,
    /// 可合成候选中不存在的新决策
    SynthesizeOne,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::SelectOne => "select_one",
            SelectionStrategy::SynthesizeOne => "synthesize_one",
        }
    }
}

/// [agent.retry] 段：反思重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 为 false 时不安装 RecoveryEngine，工具失败直接写入观察日志
    pub enabled: bool,
    pub max_retries: u32,
    /// RETRY_WAIT 第 n 次等待 backoff_seconds * 2^(n-1) 秒
    pub backoff_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff_seconds: 1.0,
        }
    }
}

/// [agent] 段：USC 主循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// reasoner 的基础指令
    pub system_prompt: String,
    /// 每步并行 reasoner 数量 K
    pub k_paths: usize,
    pub max_steps: usize,
    /// 整个 fan-out 的墙钟预算（秒）
    pub timeout_seconds: f64,
    pub selection_strategy: SelectionStrategy,
    /// 为 false 时 judge 不得合成候选中没有出现过的工具调用
    pub allow_tool_synthesis: bool,
    pub tool_result_max_chars: usize,
    /// 输出候选 / 仲裁的详细日志，不影响控制流
    pub trace: bool,
    pub retry: RetryConfig,
}

fn default_system_prompt() -> String {
    [
        "You are a helpful assistant.",
        "Use tools when they meaningfully reduce uncertainty or improve correctness.",
        "Prefer minimal tool use; do not call tools if you can answer directly.",
        "When calling a tool, make arguments valid and minimal.",
    ]
    .join("\n")
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            k_paths: 4,
            max_steps: 6,
            timeout_seconds: 20.0,
            selection_strategy: SelectionStrategy::SelectOne,
            allow_tool_synthesis: true,
            tool_result_max_chars: 400,
            trace: false,
            retry: RetryConfig::default(),
        }
    }
}

impl AgentConfig {
    /// K 路调用共享的时限；超出上限的值按上限处理
    pub fn fanout_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds.min(MAX_TIMEOUT_SECONDS))
            .unwrap_or(Duration::ZERO)
    }

    /// 校验取值范围（K >= 1、步数 >= 1、超时与退避在上限内）
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.k_paths == 0 {
            return Err(AgentError::ConfigError("k_paths must be >= 1".to_string()));
        }
        if self.max_steps == 0 {
            return Err(AgentError::ConfigError("max_steps must be >= 1".to_string()));
        }
        if !(self.timeout_seconds > 0.0 && self.timeout_seconds <= MAX_TIMEOUT_SECONDS) {
            return Err(AgentError::ConfigError(format!(
                "timeout_seconds must be in (0, {}]",
                MAX_TIMEOUT_SECONDS
            )));
        }
        if !(self.retry.backoff_seconds >= 0.0 && self.retry.backoff_seconds <= MAX_BACKOFF_SECONDS) {
            return Err(AgentError::ConfigError(format!(
                "retry.backoff_seconds must be in [0, {}]",
                MAX_BACKOFF_SECONDS
            )));
        }
        if self.tool_result_max_chars == 0 {
            return Err(AgentError::ConfigError(
                "tool_result_max_chars must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// [llm] 段：后端选择、各角色模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub reasoner: ModelSection,
    pub judge: ModelSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            reasoner: ModelSection {
                model: None,
                temperature: 0.7,
            },
            judge: ModelSection {
                model: None,
                temperature: 0.0,
            },
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// [llm.reasoner] / [llm.judge] 段：未设置 model 时沿用 llm.model
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelSection {
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 USC__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 USC__*（双下划线表示嵌套键）
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
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("USC")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
