//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预设回复；回放完毕后重复最后一条。记录收到的每组消息，便于断言 prompt 内容。
//! 可设置每次调用计入的 token 数，用于测试用量统计。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, TokenCount, TokenUsage};
use crate::memory::Message;

/// 预设回复的 Mock 客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
    per_call: (u64, u64),
    usage: TokenUsage,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            per_call: (0, 0),
            usage: TokenUsage::new(),
        }
    }

    /// 每次调用计入 (prompt, completion) 个 token
    pub fn with_usage_per_call(mut self, prompt: u64, completion: u64) -> Self {
        self.per_call = (prompt, completion);
        self
    }

    /// 已收到的调用（每次调用的完整消息列表）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn token_usage(&self) -> TokenCount {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        self.usage.add(self.per_call.0, self.per_call.1);
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| LlmError::Api("mock state poisoned".to_string()))?;
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().unwrap_or(Err(LlmError::EmptyResponse)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_repeats_last() {
        let client = ScriptedLlmClient::new(["a", "b"]);
        let msgs = [Message::user("hi")];
        assert_eq!(client.complete(&msgs).await.unwrap(), "a");
        assert_eq!(client.complete(&msgs).await.unwrap(), "b");
        assert_eq!(client.complete(&msgs).await.unwrap(), "b");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_usage_counted_per_call() {
        let client = ScriptedLlmClient::new(["a"]).with_usage_per_call(10, 2);
        assert_eq!(client.token_usage(), TokenCount::default());
        client.complete(&[Message::user("hi")]).await.unwrap();
        client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(client.token_usage(), TokenCount::new(20, 4));
    }

    #[tokio::test]
    async fn test_empty_script() {
        let client = ScriptedLlmClient::new(Vec::<String>::new());
        assert_eq!(
            client.complete(&[Message::user("hi")]).await,
            Err(LlmError::EmptyResponse)
        );
    }
}
