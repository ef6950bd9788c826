//! USC 过程事件：可选的 trace 旁路通道，用于展示候选、仲裁、工具调用与观察

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::LoopPhase;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UscEvent {
    /// 步数与阶段更新
    StepUpdate {
        step: usize,
        max_steps: usize,
        phase: LoopPhase,
    },
    /// 本步候选（合法与被拒绝的）
    Candidates {
        step: usize,
        valid: serde_json::Value,
        rejected: serde_json::Value,
    },
    /// judge 决策
    JudgeDecision {
        step: usize,
        decision: serde_json::Value,
    },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 反思重试（每次分类一条）
    Retry {
        tool: String,
        attempt: u32,
        outcome: String,
        explanation: String,
    },
    /// 工具观察（已截断）
    Observation {
        tool: String,
        success: bool,
        retries: u32,
        text: String,
    },
    /// 本次运行的 token 用量（在 Final 之前发送）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Final {
        answer: String,
        forced: bool,
    },
}

/// 通道已关闭时静默丢弃
pub(crate) fn send_event(tx: Option<&UnboundedSender<UscEvent>>, event: UscEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
