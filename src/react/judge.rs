//! Arbitrator：把候选集合交给 judge 仲裁出唯一的权威决策
//!
//! 回退规则：
//! - 候选为空：不调用 judge，直接给出兜底 FINAL
//! - judge 输出不合法（或调用失败但可达）：兜底 FINAL
//! - 不允许合成工具时，合成出候选中没有的工具调用：回退到一致度最高的候选
//! - judge 不可达：向上传播

use std::sync::Arc;

use crate::config::SelectionStrategy;
use crate::core::{AgentError, CapabilityError};
use crate::react::capability::{ArbitrationCapability, ArbitrationRequest};
use crate::react::decision::{Action, CandidateSet, JudgeDecision};
use crate::react::normalize::normalize_judge;
use crate::react::validate::{check_action, parse_judge};
use crate::tools::ToolRegistry;

pub const CAUSE_NO_CANDIDATES: &str = "no valid candidates";
pub const CAUSE_MALFORMED: &str = "malformed judge output";
pub const CAUSE_BUDGET: &str = "step budget exhausted";

/// 兜底 FINAL 的答案文本：说明未能完全解决，并引用最近一条观察
pub fn best_effort_answer(last_observation: Option<&str>) -> String {
    match last_observation {
        Some(obs) => format!(
            "I could not fully resolve the task. Most recent observation: {}",
            obs
        ),
        None => "I could not fully resolve the task: no usable decision or observation was available."
            .to_string(),
    }
}

pub fn best_effort_final(last_observation: Option<&str>, cause: &str) -> JudgeDecision {
    JudgeDecision::best_effort_final(
        best_effort_answer(last_observation),
        format!("best-effort final: {}", cause),
    )
}

pub struct Arbitrator {
    judge: Arc<dyn ArbitrationCapability>,
    registry: Arc<ToolRegistry>,
    strategy: SelectionStrategy,
    allow_tool_synthesis: bool,
    trace: bool,
}

impl Arbitrator {
    pub fn new(
        judge: Arc<dyn ArbitrationCapability>,
        registry: Arc<ToolRegistry>,
        strategy: SelectionStrategy,
        allow_tool_synthesis: bool,
    ) -> Self {
        Self {
            judge,
            registry,
            strategy,
            allow_tool_synthesis,
            trace: false,
        }
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// 仲裁本步决策；只有 judge 不可达时返回错误
    pub async fn arbitrate(
        &self,
        task: &str,
        state_summary: &str,
        last_observation: Option<&str>,
        candidates: &CandidateSet,
    ) -> Result<JudgeDecision, AgentError> {
        if candidates.is_empty() {
            tracing::warn!("empty candidate set, skipping judge");
            return Ok(best_effort_final(last_observation, CAUSE_NO_CANDIDATES));
        }

        let request = ArbitrationRequest {
            task: task.to_string(),
            state_summary: state_summary.to_string(),
            candidates: candidates.clone(),
            strategy: self.strategy,
            allow_tool_synthesis: self.allow_tool_synthesis,
            forced: false,
        };
        let raw = match self.judge.arbitrate(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                judge_failure(&e)?;
                return Ok(best_effort_final(last_observation, CAUSE_MALFORMED));
            }
        };

        let normalized = normalize_judge(&raw, &self.registry.tool_names());
        let parsed = match parse_judge(&normalized) {
            Ok(parsed) => parsed,
            Err(errors) => {
                tracing::warn!(errors = ?errors, "malformed judge output");
                return Ok(best_effort_final(last_observation, CAUSE_MALFORMED));
            }
        };

        let decision = match self.strategy {
            SelectionStrategy::SelectOne => select_candidate(parsed, candidates),
            SelectionStrategy::SynthesizeOne => Some(self.apply_synthesis_policy(parsed, candidates)),
        };
        let decision = match decision {
            Some(d) => d,
            None => {
                tracing::warn!("judge selected no candidate");
                return Ok(best_effort_final(last_observation, CAUSE_MALFORMED));
            }
        };

        if self.trace {
            tracing::info!(
                selected_index = ?decision.selected_index,
                decision = %serde_json::to_string(&decision).unwrap_or_default(),
                "judge decision"
            );
        }
        Ok(decision)
    }

    /// 步数耗尽后的单次收尾仲裁：只接受 FINAL，其余情况给出兜底 FINAL
    pub async fn force_final(
        &self,
        task: &str,
        state_summary: &str,
        last_observation: Option<&str>,
    ) -> Result<JudgeDecision, AgentError> {
        let request = ArbitrationRequest {
            task: task.to_string(),
            state_summary: state_summary.to_string(),
            candidates: CandidateSet::new(),
            strategy: self.strategy,
            allow_tool_synthesis: false,
            forced: true,
        };
        let raw = match self.judge.arbitrate(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                judge_failure(&e)?;
                return Ok(best_effort_final(last_observation, CAUSE_BUDGET));
            }
        };

        let normalized = normalize_judge(&raw, &self.registry.tool_names());
        match parse_judge(&normalized) {
            Ok(parsed) if parsed.action.is_final() => Ok(JudgeDecision {
                selected_index: None,
                ..parsed
            }),
            Ok(_) => {
                tracing::warn!("forced finalization returned a tool call");
                Ok(best_effort_final(last_observation, CAUSE_BUDGET))
            }
            Err(errors) => {
                tracing::warn!(errors = ?errors, "malformed forced final");
                Ok(best_effort_final(last_observation, CAUSE_BUDGET))
            }
        }
    }

    /// synthesize_one：下标一律清空；合成的动作不满足策略或注册表时回退
    fn apply_synthesis_policy(
        &self,
        parsed: JudgeDecision,
        candidates: &CandidateSet,
    ) -> JudgeDecision {
        let decision = JudgeDecision {
            selected_index: None,
            ..parsed
        };

        if let Action::ToolCall { tool_name, .. } = &decision.action {
            if !self.allow_tool_synthesis && !candidates.proposes_tool(tool_name) {
                tracing::warn!(tool = %tool_name, "synthesized tool not among candidates, falling back");
                return fallback(candidates, "synthesized tool call rejected");
            }
        }
        let errors = check_action(&decision.action, &self.registry);
        if !errors.is_empty() {
            tracing::warn!(errors = ?errors, "synthesized decision invalid, falling back");
            return fallback(candidates, "synthesized decision invalid");
        }
        decision
    }
}

fn judge_failure(e: &CapabilityError) -> Result<(), AgentError> {
    if e.is_unreachable() {
        tracing::error!(error = %e, "judge unreachable");
        return Err(AgentError::CapabilityUnavailable(format!("judge: {}", e)));
    }
    tracing::warn!(error = %e, "judge call failed");
    Ok(())
}

/// select_one：有效下标原样复制；否则若动作与某候选完全一致则取其下标；否则 None
fn select_candidate(parsed: JudgeDecision, candidates: &CandidateSet) -> Option<JudgeDecision> {
    let index = parsed
        .selected_index
        .filter(|i| *i < candidates.len())
        .or_else(|| candidates.position_of(&parsed.action))?;
    let candidate = candidates.get(index)?;
    Some(JudgeDecision::from_candidate(
        index,
        candidate,
        parsed.justification,
    ))
}

/// 回退到一致度最高的候选（并列取最小下标）；没有候选时兜底 FINAL
fn fallback(candidates: &CandidateSet, cause: &str) -> JudgeDecision {
    match candidates
        .consensus_index()
        .and_then(|i| candidates.get(i).map(|c| (i, c)))
    {
        Some((i, c)) => JudgeDecision::from_candidate(i, c, format!("fallback to candidate {}: {}", i, cause)),
        None => best_effort_final(None, cause),
    }
}
