//! react-usc：Universal Self-Consistency 的 ReAct 智能体
//!
//! 每一步并发生成 K 个候选动作，由 judge 仲裁出唯一决策，执行一个工具调用后进入下一步；
//! 工具失败由反思模型分类后修正重试、退避重试或放弃。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、循环 / 重试状态、反思重试引擎、Agent 构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: LLM 消息与观察日志
//! - **observability**: tracing 订阅器初始化
//! - **react**: 候选生成、仲裁、动作执行与 USC 主循环
//! - **tools**: 工具 trait、参数 Schema、注册表、执行器与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{AgentBuilder, AgentError};
pub use crate::react::{RunOutcome, UscAgent, UscEvent};
