//! Agent 构建器：从 AppConfig 组装工具注册表、各角色 LLM 客户端与 UscAgent
//!
//! reasoner 与 judge 可分别配置模型和温度；reflection 复用 reasoner 的模型（温度取 judge 的，输出更稳定）。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, ModelSection};
use crate::core::AgentError;
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient};
use crate::react::{LlmJudge, LlmReasoner, LlmReflector, UscAgent};
use crate::tools::{ApiClientTool, CalculatorTool, SimpleSearchTool, ToolRegistry};

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 内置工具：calculator / simple_search / api_client
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool);
        tools.register(SimpleSearchTool::new());
        tools.register(ApiClientTool::new());
        tools
    }

    /// 按 provider 构建某个角色的 LLM 客户端；role.model 为空时沿用 llm.model
    pub fn build_llm(&self, role: &ModelSection) -> Result<Arc<dyn LlmClient>, AgentError> {
        let llm = &self.config.llm;
        let model = role.model.clone().unwrap_or_else(|| llm.model.clone());
        let client = match llm.provider.to_lowercase().as_str() {
            "deepseek" => match llm.base_url.as_deref() {
                Some(url) => OpenAiClient::new(Some(url), &model, deepseek_key().as_deref()),
                None => create_deepseek_client(Some(&model)),
            },
            "openai" => {
                if std::env::var("OPENAI_API_KEY").is_err() {
                    tracing::warn!("OPENAI_API_KEY not set, requests will likely fail");
                }
                OpenAiClient::new(llm.base_url.as_deref(), &model, None)
            }
            other => {
                return Err(AgentError::ConfigError(format!(
                    "unknown llm provider '{}' (expected deepseek or openai)",
                    other
                )))
            }
        };
        tracing::info!(provider = %llm.provider, model = %client.model(), temperature = role.temperature, "llm client");
        Ok(Arc::new(
            client
                .with_temperature(role.temperature)
                .with_request_timeout(llm.timeouts.request),
        ))
    }

    /// 组装 LLM 驱动的 UscAgent
    pub fn build_agent(&self) -> Result<UscAgent, AgentError> {
        let llm = &self.config.llm;
        let reasoner_llm = self.build_llm(&llm.reasoner)?;
        let judge_llm = self.build_llm(&llm.judge)?;
        let reflection_llm = self.build_llm(&ModelSection {
            model: llm.reasoner.model.clone(),
            temperature: llm.judge.temperature,
        })?;

        let agent = UscAgent::new(
            self.config.agent.clone(),
            Arc::new(self.build_tool_registry()),
            Arc::new(LlmReasoner::new(reasoner_llm)),
            Arc::new(LlmJudge::new(judge_llm)),
            self.config.tools.tool_timeout_secs,
        )?
        .with_reflection(Arc::new(LlmReflector::new(reflection_llm)));
        Ok(agent)
    }
}

fn deepseek_key() -> Option<String> {
    std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
}

/// 便捷函数：加载配置（失败时退回默认值）并创建 AgentBuilder
pub fn create_agent_builder(config_path: Option<PathBuf>) -> AgentBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    AgentBuilder::new(config)
}
