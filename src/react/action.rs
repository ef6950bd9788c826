//! Action Executor：执行 judge 选中的唯一工具调用，把结果或失败转为一条 Observation
//!
//! 首次失败时若安装了 ToolFailureHandler 则交给它重试；否则失败直接写入观察日志。
//! 无论成功、重试成功、ABORT 还是耗尽，一次调用只产生一条观察。

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::{RetryAttempt, ToolFailureHandler};
use crate::memory::{truncate, Observation};
use crate::tools::ToolExecutor;

/// 一次动作执行的结果
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub observation: Observation,
    /// 反思重试的分类记录（未失败或未安装处理器时为空）
    pub retry_history: Vec<RetryAttempt>,
}

pub struct ActionExecutor {
    tools: ToolExecutor,
    failure_handler: Option<Arc<dyn ToolFailureHandler>>,
    max_chars: usize,
}

impl ActionExecutor {
    pub fn new(tools: ToolExecutor, max_chars: usize) -> Self {
        Self {
            tools,
            failure_handler: None,
            max_chars,
        }
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn ToolFailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    pub async fn execute(
        &self,
        step: usize,
        task: &str,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> ActionOutcome {
        let first = self.tools.invoke(tool_name, args).await;

        let (result, retries, retry_history) = match (first, &self.failure_handler) {
            (Ok(value), _) => (Ok(value), 0, Vec::new()),
            (Err(failure), None) => {
                tracing::warn!(tool = %tool_name, error = %failure, "tool failed");
                (Err(failure.observation(tool_name)), 0, Vec::new())
            }
            (Err(failure), Some(handler)) => {
                tracing::warn!(tool = %tool_name, error = %failure, "tool failed, reflecting");
                let report = handler
                    .recover(&self.tools, task, tool_name, args.clone(), failure)
                    .await;
                let result = report.result.map_err(|f| f.observation(tool_name));
                (result, report.retries, report.history)
            }
        };

        let (success, text) = match result {
            Ok(value) => (
                true,
                format!("{} => {}", tool_name, truncate(&value.to_string(), self.max_chars)),
            ),
            Err(text) => (false, truncate(&text, self.max_chars)),
        };

        ActionOutcome {
            observation: Observation {
                step,
                tool: tool_name.to_string(),
                success,
                retries,
                text,
            },
            retry_history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::tools::{CalculatorTool, SimpleSearchTool, ToolRegistry};

    fn executor(max_chars: usize) -> ActionExecutor {
        let mut r = ToolRegistry::new();
        r.register(CalculatorTool);
        r.register(SimpleSearchTool::new());
        ActionExecutor::new(ToolExecutor::new(Arc::new(r), 5), max_chars)
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_success_observation() {
        let out = executor(400)
            .execute(1, "q", "calculator", &obj(json!({"expression": "2+2*10"})))
            .await;
        assert_eq!(out.observation.text, "calculator => 22");
        assert!(out.observation.success);
        assert_eq!(out.observation.retries, 0);
    }

    #[tokio::test]
    async fn test_failure_without_handler() {
        let out = executor(400)
            .execute(2, "q", "calculator", &obj(json!({"expression": "1/0"})))
            .await;
        assert!(!out.observation.success);
        assert!(out.observation.text.starts_with("calculator => tool_exception:"));
        assert_eq!(out.observation.step, 2);
    }

    #[tokio::test]
    async fn test_deeply_nested_expression_becomes_observation() {
        let expression = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let out = executor(400)
            .execute(1, "q", "calculator", &obj(json!({ "expression": expression })))
            .await;
        assert!(!out.observation.success);
        assert_eq!(
            out.observation.text,
            "calculator => tool_exception: expression nested too deeply"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_observation() {
        let out = executor(400).execute(1, "q", "fake_tool", &Map::new()).await;
        assert_eq!(out.observation.text, "Tool error: unknown tool 'fake_tool'");
    }

    #[tokio::test]
    async fn test_result_truncated() {
        let out = executor(40)
            .execute(1, "q", "simple_search", &obj(json!({"query": "react"})))
            .await;
        assert!(out.observation.text.starts_with("simple_search => "));
        assert!(out.observation.text.contains("... [truncated"));
    }
}
