//! Agent 错误类型与恢复动作
//!
//! - AgentError：唯一允许冒泡到调用方的致命错误（能力整体不可达、配置错误）
//! - CapabilityError：单次能力调用（reasoner / judge / reflection）失败
//! - ToolFailure：单次工具调用失败，交给 RecoveryEngine 或直接写入 Observation
//! - RecoveryAction：反思模型给出的修复策略（RETRY_FIX / RETRY_WAIT / ABORT）

use serde_json::{Map, Value};
use thiserror::Error;

/// 循环对外暴露的错误；工具失败、模型输出错误都不会走到这里
#[derive(Error, Debug)]
pub enum AgentError {
    /// 底层模型基础设施完全不可达（如 K 路 reasoner 全部网络失败）
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 单次能力调用的失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// 调用未能到达模型（网络、超时）；全部调用均如此时视为致命
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// 调用完成但结果不可用（API 报错、空回复等）
    #[error("failed: {0}")]
    Failed(String),
}

impl CapabilityError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, CapabilityError::Unreachable(_))
    }
}

/// 工具调用失败；Display 即写入 ObservationLog 的错误描述（不含工具名前缀）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolFailure {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid_args: {0:?}")]
    InvalidArgs(Vec<String>),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("tool_exception: {0}")]
    Failed(String),
}

impl ToolFailure {
    /// 渲染为 Observation 文本：未知工具单独格式，其余为 "{tool} => {描述}"
    pub fn observation(&self, tool: &str) -> String {
        match self {
            ToolFailure::UnknownTool(name) => format!("Tool error: unknown tool '{}'", name),
            other => format!("{} => {}", tool, other),
        }
    }
}

/// 反思模型对一次工具失败的分类结果
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 用修正后的参数立即重试
    RetryFix(Map<String, Value>),
    /// 视为暂时性故障：指数退避后原参数重试
    RetryWait,
    /// 致命或不可修复：停止重试
    Abort,
}

impl RecoveryAction {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::RetryFix(_) => "RETRY_FIX",
            RecoveryAction::RetryWait => "RETRY_WAIT",
            RecoveryAction::Abort => "ABORT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_observation() {
        let f = ToolFailure::UnknownTool("fake_tool".to_string());
        assert_eq!(f.observation("fake_tool"), "Tool error: unknown tool 'fake_tool'");
    }

    #[test]
    fn test_tool_exception_observation() {
        let f = ToolFailure::Failed("403 Forbidden".to_string());
        assert_eq!(f.observation("api_client"), "api_client => tool_exception: 403 Forbidden");
    }

    #[test]
    fn test_invalid_args_observation() {
        let f = ToolFailure::InvalidArgs(vec!["Missing required key: expression".to_string()]);
        let obs = f.observation("calculator");
        assert!(obs.starts_with("calculator => invalid_args:"));
        assert!(obs.contains("expression"));
    }

    #[test]
    fn test_capability_error_kind() {
        assert!(CapabilityError::Unreachable("dns".into()).is_unreachable());
        assert!(!CapabilityError::Failed("bad".into()).is_unreachable());
    }
}
