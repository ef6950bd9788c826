//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时：invoke(tool_name, args) 先查找工具、复检参数 Schema，
//! 再在超时内执行；失败统一转为 ToolFailure。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::ToolFailure;
use crate::tools::{Tool, ToolRegistry, ToolSchema};

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolFailure
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn schema_of(&self, tool_name: &str) -> Option<ToolSchema> {
        self.registry.get(tool_name).map(|t| t.input_schema())
    }

    /// 执行指定工具：未注册 -> UnknownTool；参数不合法 -> InvalidArgs；超时 -> Timeout；工具报错 -> Failed
    pub async fn invoke(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolFailure> {
        let start = Instant::now();
        let result = self.invoke_inner(tool_name, args).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolFailure::UnknownTool(_)) => "unknown_tool",
            Err(ToolFailure::InvalidArgs(_)) => "invalid_args",
            Err(ToolFailure::Timeout(_)) => "timeout",
            Err(ToolFailure::Failed(_)) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "tool");

        result
    }

    async fn invoke_inner(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolFailure> {
        let tool: Arc<dyn Tool> = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolFailure::UnknownTool(tool_name.to_string()))?;

        let errors = self
            .registry
            .validate_args(tool_name, args)
            .unwrap_or_default();
        if !errors.is_empty() {
            return Err(ToolFailure::InvalidArgs(errors));
        }

        match timeout(self.timeout, tool.execute(args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ToolFailure::Failed(e)),
            Err(_) => Err(ToolFailure::Timeout(self.timeout.as_secs())),
        }
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
