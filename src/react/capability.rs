//! 能力接口：reasoner / judge / reflection 三个异步 trait，以及基于 LlmClient 的实现
//!
//! 能力只负责「一次调用 -> 原始 payload」；归一化、校验、回退都在调用方完成。
//! 原始 payload 为 serde_json::Value，LLM 实现返回 Value::String（模型原文）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::SelectionStrategy;
use crate::core::CapabilityError;
use crate::llm::{LlmClient, TokenCount};
use crate::react::decision::CandidateSet;
use crate::react::prompts;

/// 一步内 K 路 reasoner 共享的上下文
#[derive(Debug, Clone)]
pub struct ProposalRequest {
    pub system_prompt: String,
    pub task: String,
    pub state_summary: String,
    pub tools_block: String,
}

/// 仲裁请求；forced 为 true 时没有候选，只允许 FINAL
#[derive(Debug, Clone)]
pub struct ArbitrationRequest {
    pub task: String,
    pub state_summary: String,
    pub candidates: CandidateSet,
    pub strategy: SelectionStrategy,
    pub allow_tool_synthesis: bool,
    pub forced: bool,
}

/// 一次工具失败的反思请求
#[derive(Debug, Clone)]
pub struct ReflectionRequest {
    pub task: String,
    pub tool_name: String,
    pub args: Map<String, Value>,
    /// 工具 input_schema 的 JSON 形式（工具未注册时为 None）
    pub input_schema: Option<Value>,
    pub failure: String,
}

#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn propose(&self, request: &ProposalRequest) -> Result<Value, CapabilityError>;

    /// 累计 token 用量；不基于 LLM 的实现返回全 0
    fn token_usage(&self) -> TokenCount {
        TokenCount::default()
    }
}

#[async_trait]
pub trait ArbitrationCapability: Send + Sync {
    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<Value, CapabilityError>;

    fn token_usage(&self) -> TokenCount {
        TokenCount::default()
    }
}

#[async_trait]
pub trait ReflectionCapability: Send + Sync {
    async fn reflect(&self, request: &ReflectionRequest) -> Result<Value, CapabilityError>;

    fn token_usage(&self) -> TokenCount {
        TokenCount::default()
    }
}

/// LLM 驱动的 reasoner
pub struct LlmReasoner {
    llm: Arc<dyn LlmClient>,
}

impl LlmReasoner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReasoningCapability for LlmReasoner {
    fn token_usage(&self) -> TokenCount {
        self.llm.token_usage()
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<Value, CapabilityError> {
        let messages = prompts::reasoner_messages(
            &request.system_prompt,
            &request.task,
            &request.state_summary,
            &request.tools_block,
        );
        let text = self.llm.complete(&messages).await?;
        Ok(Value::String(text))
    }
}

/// LLM 驱动的 judge
pub struct LlmJudge {
    llm: Arc<dyn LlmClient>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ArbitrationCapability for LlmJudge {
    fn token_usage(&self) -> TokenCount {
        self.llm.token_usage()
    }

    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<Value, CapabilityError> {
        let messages = if request.forced {
            prompts::forced_final_messages(&request.task, &request.state_summary)
        } else {
            prompts::judge_messages(
                &request.task,
                &request.state_summary,
                &request.candidates,
                request.strategy,
                request.allow_tool_synthesis,
            )
        };
        let text = self.llm.complete(&messages).await?;
        Ok(Value::String(text))
    }
}

/// LLM 驱动的 reflection（通常复用 reasoner 的模型）
pub struct LlmReflector {
    llm: Arc<dyn LlmClient>,
}

impl LlmReflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReflectionCapability for LlmReflector {
    fn token_usage(&self) -> TokenCount {
        self.llm.token_usage()
    }

    async fn reflect(&self, request: &ReflectionRequest) -> Result<Value, CapabilityError> {
        let messages = prompts::reflection_messages(
            &request.task,
            &request.tool_name,
            &request.args,
            request.input_schema.as_ref(),
            &request.failure,
        );
        let text = self.llm.complete(&messages).await?;
        Ok(Value::String(text))
    }
}
