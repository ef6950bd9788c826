//! 决策类型：reasoner 候选、judge 仲裁结果与候选集合
//!
//! Action 是两种决策的公共标签联合（TOOL_CALL / FINAL），各处消费时穷尽匹配。
//! 序列化形状与模型交互的 JSON 一致：{"decision_type": "TOOL_CALL", "tool_name": ..., "tool_args": {...}}。

use serde::Serialize;
use serde_json::{Map, Value};

/// 单步动作：调用一个工具，或给出最终答案
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    ToolCall {
        tool_name: String,
        tool_args: Map<String, Value>,
    },
    Final {
        final_answer: String,
    },
}

impl Action {
    pub fn tool_call(tool_name: impl Into<String>, tool_args: Map<String, Value>) -> Self {
        Action::ToolCall {
            tool_name: tool_name.into(),
            tool_args,
        }
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        Action::Final {
            final_answer: answer.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::ToolCall { .. } => "TOOL_CALL",
            Action::Final { .. } => "FINAL",
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Action::ToolCall { tool_name, .. } => Some(tool_name),
            Action::Final { .. } => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Action::Final { .. })
    }
}

/// reasoner 产出的单个候选，只在一步内存活
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonerDecision {
    #[serde(flatten)]
    pub action: Action,
    pub brief_rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_signal: Option<String>,
}

/// judge 的权威决策：每步恰好一个
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeDecision {
    #[serde(flatten)]
    pub action: Action,
    /// 选中候选的下标；合成或兜底 FINAL 时为 None
    pub selected_index: Option<usize>,
    pub justification: String,
    /// 选中候选时为该候选的 rationale；合成时取 judge 给出的 rationale 或 justification
    pub brief_rationale: String,
}

impl JudgeDecision {
    /// 原样复制某个候选（select_one 与回退路径使用）
    pub fn from_candidate(index: usize, candidate: &ReasonerDecision, justification: impl Into<String>) -> Self {
        Self {
            action: candidate.action.clone(),
            selected_index: Some(index),
            justification: justification.into(),
            brief_rationale: candidate.brief_rationale.clone(),
        }
    }

    /// 不调用模型的兜底 FINAL
    pub fn best_effort_final(answer: impl Into<String>, justification: impl Into<String>) -> Self {
        let justification = justification.into();
        Self {
            action: Action::final_answer(answer),
            selected_index: None,
            brief_rationale: justification.clone(),
            justification,
        }
    }
}

/// 被校验拒绝的候选（仅用于 trace）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedCandidate {
    /// fan-out 中的调用序号
    pub path_id: usize,
    pub reason: String,
}

/// 一步内的候选集合：按 fan-out 调用序号排列，写入后只读；允许为空
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandidateSet {
    candidates: Vec<ReasonerDecision>,
    /// 与 candidates 一一对应的原始调用序号
    path_ids: Vec<usize>,
    rejected: Vec<RejectedCandidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_valid(&mut self, path_id: usize, decision: ReasonerDecision) {
        self.candidates.push(decision);
        self.path_ids.push(path_id);
    }

    pub fn push_rejected(&mut self, path_id: usize, reason: impl Into<String>) {
        self.rejected.push(RejectedCandidate {
            path_id,
            reason: reason.into(),
        });
    }

    pub fn candidates(&self) -> &[ReasonerDecision] {
        &self.candidates
    }

    pub fn get(&self, index: usize) -> Option<&ReasonerDecision> {
        self.candidates.get(index)
    }

    pub fn path_ids(&self) -> &[usize] {
        &self.path_ids
    }

    pub fn rejected(&self) -> &[RejectedCandidate] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// 是否有候选提议调用该工具
    pub fn proposes_tool(&self, tool_name: &str) -> bool {
        self.candidates
            .iter()
            .any(|c| c.action.tool_name() == Some(tool_name))
    }

    /// 与给定动作完全相同的第一个候选下标
    pub fn position_of(&self, action: &Action) -> Option<usize> {
        self.candidates.iter().position(|c| &c.action == action)
    }

    /// 回退用的最高排名候选：按相同动作的候选数量（一致度）排名，并列取最小下标
    pub fn consensus_index(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, c) in self.candidates.iter().enumerate() {
            let votes = self
                .candidates
                .iter()
                .filter(|other| other.action == c.action)
                .count();
            match best {
                Some((_, best_votes)) if votes <= best_votes => {}
                _ => best = Some((i, votes)),
            }
        }
        best.map(|(i, _)| i)
    }
}
