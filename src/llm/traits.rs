//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete（非流式）。
//! LlmError 区分「没能到达模型」与「到达但结果不可用」，上层据此决定是否视为致命。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::CapabilityError;
use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 网络层失败（连接、DNS、TLS 等）
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// 服务端返回错误（鉴权、限流、参数等）
    #[error("api error: {0}")]
    Api(String),

    #[error("empty response")]
    EmptyResponse,
}

impl From<LlmError> for CapabilityError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Network(_) | LlmError::Timeout(_) => CapabilityError::Unreachable(e.to_string()),
            LlmError::Api(_) | LlmError::EmptyResponse => CapabilityError::Failed(e.to_string()),
        }
    }
}

/// token 用量快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCount {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenCount {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// 相对更早快照的增量
    pub fn since(self, earlier: TokenCount) -> TokenCount {
        TokenCount::new(
            self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            self.completion_tokens.saturating_sub(earlier.completion_tokens),
        )
    }
}

impl std::ops::Add for TokenCount {
    type Output = TokenCount;

    fn add(self, rhs: TokenCount) -> TokenCount {
        TokenCount::new(
            self.prompt_tokens + rhs.prompt_tokens,
            self.completion_tokens + rhs.completion_tokens,
        )
    }
}

/// 累计 token 计数器，可在并发调用间共享
#[derive(Debug, Default)]
pub struct TokenUsage {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> TokenCount {
        TokenCount::new(
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 用量；不统计的实现返回全 0
    fn token_usage(&self) -> TokenCount {
        TokenCount::default()
    }
}
