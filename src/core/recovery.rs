//! 反思重试引擎
//!
//! 工具首次失败后接管：调用 reflection 能力把失败分类为 RETRY_FIX / RETRY_WAIT / ABORT，
//! 按分类修正参数或指数退避后重新调用，直到成功、ABORT 或耗尽 max_retries。
//! reflection 调用失败或输出无法解析时一律按 ABORT 处理，避免无界重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::state::{RetryPhase, RetryState};
use crate::core::{RecoveryAction, ToolFailure};
use crate::react::capability::{ReflectionCapability, ReflectionRequest};
use crate::react::normalize::normalize_reflection;
use crate::react::validate::parse_reflection;
use crate::tools::ToolExecutor;

/// RETRY_WAIT 第 attempt 次（从 1 开始）的等待时长：backoff * 2^(attempt-1)，溢出时取 Duration::MAX
pub fn backoff_delay(backoff_seconds: f64, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(30) as i32;
    let secs = (backoff_seconds * 2f64.powi(exp)).max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// 一次重试的记录（供 trace 事件）
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub outcome: &'static str,
    pub explanation: String,
    pub failure: String,
}

/// 恢复失败的终态
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryFailure {
    /// 未尝试恢复（max_retries 为 0）
    Unrecovered(ToolFailure),
    Aborted {
        explanation: String,
        last_error: String,
    },
    Exhausted {
        attempts: u32,
        last_error: String,
    },
}

impl RecoveryFailure {
    /// 渲染为 Observation 文本
    pub fn observation(&self, tool: &str) -> String {
        match self {
            RecoveryFailure::Unrecovered(f) => f.observation(tool),
            RecoveryFailure::Aborted {
                explanation,
                last_error,
            } => format!(
                "{} => reflection_abort: {} (last error: {})",
                tool, explanation, last_error
            ),
            RecoveryFailure::Exhausted {
                attempts,
                last_error,
            } => format!("{} => retries_exhausted after {}: {}", tool, attempts, last_error),
        }
    }
}

/// 恢复结果：最终值或失败，以及实际发起的重试次数
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub result: Result<Value, RecoveryFailure>,
    pub retries: u32,
    pub history: Vec<RetryAttempt>,
}

/// 工具失败处理接口；未安装时失败直接写入观察日志
#[async_trait]
pub trait ToolFailureHandler: Send + Sync {
    async fn recover(
        &self,
        executor: &ToolExecutor,
        task: &str,
        tool_name: &str,
        args: Map<String, Value>,
        failure: ToolFailure,
    ) -> RecoveryReport;
}

pub struct RecoveryEngine {
    reflector: Arc<dyn ReflectionCapability>,
    max_retries: u32,
    backoff_seconds: f64,
}

impl RecoveryEngine {
    pub fn new(reflector: Arc<dyn ReflectionCapability>, max_retries: u32, backoff_seconds: f64) -> Self {
        Self {
            reflector,
            max_retries,
            backoff_seconds,
        }
    }

    /// 调用 reflection 分类；任何异常都归为 ABORT
    async fn classify(
        &self,
        executor: &ToolExecutor,
        task: &str,
        tool_name: &str,
        args: &Map<String, Value>,
        failure: &ToolFailure,
    ) -> (RecoveryAction, String) {
        let request = ReflectionRequest {
            task: task.to_string(),
            tool_name: tool_name.to_string(),
            args: args.clone(),
            input_schema: executor.schema_of(tool_name).map(|s| s.to_json()),
            failure: failure.to_string(),
        };
        match self.reflector.reflect(&request).await {
            Ok(raw) => parse_reflection(&normalize_reflection(&raw)).unwrap_or_else(|| {
                tracing::warn!(tool = %tool_name, "unparseable reflection output, aborting");
                (
                    RecoveryAction::Abort,
                    "reflection output could not be classified".to_string(),
                )
            }),
            Err(e) => {
                tracing::warn!(tool = %tool_name, error = %e, "reflection call failed, aborting");
                (RecoveryAction::Abort, format!("reflection failed: {}", e))
            }
        }
    }
}

#[async_trait]
impl ToolFailureHandler for RecoveryEngine {
    async fn recover(
        &self,
        executor: &ToolExecutor,
        task: &str,
        tool_name: &str,
        mut args: Map<String, Value>,
        failure: ToolFailure,
    ) -> RecoveryReport {
        let mut history = Vec::new();
        if self.max_retries == 0 {
            return RecoveryReport {
                result: Err(RecoveryFailure::Unrecovered(failure)),
                retries: 0,
                history,
            };
        }

        let mut state = RetryState::new(failure.to_string());
        let mut last = failure;

        loop {
            if state.exhausted(self.max_retries) {
                tracing::warn!(tool = %tool_name, attempts = state.attempt, "retries exhausted");
                return RecoveryReport {
                    result: Err(RecoveryFailure::Exhausted {
                        attempts: state.attempt,
                        last_error: state.last_failure,
                    }),
                    retries: state.attempt,
                    history,
                };
            }

            state.phase = RetryPhase::Classifying;
            let (action, explanation) = self.classify(executor, task, tool_name, &args, &last).await;
            state.classified(&action);
            tracing::info!(
                tool = %tool_name,
                attempt = state.attempt + 1,
                outcome = action.label(),
                explanation = %explanation,
                "reflection"
            );
            history.push(RetryAttempt {
                attempt: state.attempt + 1,
                outcome: action.label(),
                explanation: explanation.clone(),
                failure: state.last_failure.clone(),
            });

            match action {
                RecoveryAction::Abort => {
                    return RecoveryReport {
                        result: Err(RecoveryFailure::Aborted {
                            explanation,
                            last_error: state.last_failure,
                        }),
                        retries: state.attempt,
                        history,
                    };
                }
                RecoveryAction::RetryFix(fixed) => {
                    // 修正参数整体替换，即使不合法也会在下一次调用中计为一次尝试
                    args = fixed;
                }
                RecoveryAction::RetryWait => {
                    let delay = backoff_delay(self.backoff_seconds, state.attempt + 1);
                    tracing::debug!(tool = %tool_name, delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::time::sleep(delay).await;
                }
            }

            state.attempt += 1;
            match executor.invoke(tool_name, &args).await {
                Ok(value) => {
                    return RecoveryReport {
                        result: Ok(value),
                        retries: state.attempt,
                        history,
                    };
                }
                Err(f) => {
                    state.failed_again(f.to_string());
                    last = f;
                }
            }
        }
    }
}
