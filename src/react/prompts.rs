//! Prompt 构造：reasoner / judge / 强制收尾 / reflection
//!
//! 输出契约用 schemars 从下面的 payload 结构生成 JSON Schema 嵌入 prompt；
//! 这些结构只描述形状，真正的解析走 normalize + validate。

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::SelectionStrategy;
use crate::memory::Message;
use crate::react::decision::CandidateSet;

#[derive(Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(dead_code)]
enum DecisionType {
    ToolCall,
    Final,
}

/// reasoner 输出形状
#[derive(Serialize, JsonSchema)]
#[schemars(rename = "ReasonerDecision")]
#[allow(dead_code)]
struct ReasonerPayload {
    decision_type: DecisionType,
    /// TOOL_CALL 时必填
    tool_name: Option<String>,
    /// TOOL_CALL 时必填，必须满足该工具的 input_schema
    tool_args: Option<Map<String, Value>>,
    /// FINAL 时必填
    final_answer: Option<String>,
    /// 1-2 句说明为何这是最佳下一步
    brief_rationale: String,
    expected_signal: Option<String>,
}

/// judge 输出形状
#[derive(Serialize, JsonSchema)]
#[schemars(rename = "JudgeDecision")]
#[allow(dead_code)]
struct JudgePayload {
    decision_type: DecisionType,
    /// select_one 时为选中候选的下标；synthesize_one 时为 null
    selected_index: Option<u32>,
    tool_name: Option<String>,
    tool_args: Option<Map<String, Value>>,
    final_answer: Option<String>,
    justification: String,
}

#[derive(Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(dead_code)]
enum ReflectionOutcome {
    RetryFix,
    RetryWait,
    Abort,
}

/// reflection 输出形状
#[derive(Serialize, JsonSchema)]
#[schemars(rename = "ReflectionDecision")]
#[allow(dead_code)]
struct ReflectionPayload {
    outcome: ReflectionOutcome,
    /// RETRY_FIX 时必填：完整的修正后参数
    fixed_args: Option<Map<String, Value>>,
    explanation: String,
}

fn schema_json<T: JsonSchema>() -> String {
    serde_json::to_string(&schema_for!(T)).unwrap_or_default()
}

pub fn reasoner_schema() -> String {
    schema_json::<ReasonerPayload>()
}

pub fn judge_schema() -> String {
    schema_json::<JudgePayload>()
}

pub fn reflection_schema() -> String {
    schema_json::<ReflectionPayload>()
}

/// K 路 reasoner 共用同一份 prompt（上下文一致，多样性来自采样）
pub fn reasoner_messages(
    system_prompt: &str,
    task: &str,
    state_summary: &str,
    tools_block: &str,
) -> Vec<Message> {
    let system = [
        "You are a REASONER model inside a ReAct-style agent.",
        "Follow the agent system instructions, then decide the single best next action.",
        "Return ONLY a JSON object matching the ReasonerDecision schema.",
        "Never include extra keys.",
    ]
    .join("\n");

    let user = [
        "REASONER INSTRUCTIONS:".to_string(),
        system_prompt.trim().to_string(),
        String::new(),
        "ORIGINAL_USER_QUERY:".to_string(),
        task.trim().to_string(),
        String::new(),
        "CURRENT_STATE_SUMMARY:".to_string(),
        state_summary.to_string(),
        String::new(),
        "AVAILABLE_TOOLS:".to_string(),
        tools_block.to_string(),
        String::new(),
        "OUTPUT_FORMAT:".to_string(),
        "Return ONLY a JSON object that matches ReasonerDecision with either:".to_string(),
        "- decision_type=\"TOOL_CALL\" and tool_name/tool_args set, final_answer null; OR".to_string(),
        "- decision_type=\"FINAL\" and final_answer set, tool_name/tool_args null.".to_string(),
        "Do NOT wrap the JSON in markdown fences.".to_string(),
        "brief_rationale is REQUIRED: 1-2 short sentences on why this is the best next step. No placeholders like 'N/A'.".to_string(),
        format!("SCHEMA: {}", reasoner_schema()),
        String::new(),
        "JSON_ONLY:".to_string(),
    ]
    .join("\n");

    vec![Message::system(system), Message::user(user)]
}

/// 候选列表渲染为带 index 的 JSON 数组
pub fn candidates_json(candidates: &CandidateSet) -> String {
    let items: Vec<Value> = candidates
        .candidates()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut v = serde_json::to_value(c).unwrap_or(Value::Null);
            if let Value::Object(ref mut m) = v {
                m.insert("index".to_string(), Value::from(i));
            }
            v
        })
        .collect();
    Value::Array(items).to_string()
}

pub fn judge_messages(
    task: &str,
    state_summary: &str,
    candidates: &CandidateSet,
    strategy: SelectionStrategy,
    allow_tool_synthesis: bool,
) -> Vec<Message> {
    let system = [
        "You are the JUDGE model for a Universal Self-Consistency (USC) agent.",
        "You must pick the single best next decision from multiple candidates, or synthesize one.",
        "Return ONLY a JSON object matching the JudgeDecision schema.",
    ]
    .join("\n");

    let user = [
        "ORIGINAL_USER_QUERY:".to_string(),
        task.trim().to_string(),
        String::new(),
        "CURRENT_STATE_SUMMARY:".to_string(),
        state_summary.to_string(),
        String::new(),
        format!("SELECTION_STRATEGY: {}", strategy.as_str()),
        format!("ALLOW_TOOL_SYNTHESIS: {}", allow_tool_synthesis),
        String::new(),
        "CANDIDATES:".to_string(),
        candidates_json(candidates),
        String::new(),
        "RUBRIC (score high on these):".to_string(),
        "- query alignment".to_string(),
        "- consistency with observations".to_string(),
        "- tool appropriateness/minimality".to_string(),
        "- safety/policy compliance (basic)".to_string(),
        "- expected value for reducing uncertainty".to_string(),
        String::new(),
        "DECISION_RULES:".to_string(),
        "- If SELECTION_STRATEGY=select_one: set selected_index to the chosen candidate index and copy its decision.".to_string(),
        "- If SELECTION_STRATEGY=synthesize_one: selected_index must be null; you may synthesize a better single decision.".to_string(),
        "- If ALLOW_TOOL_SYNTHESIS=false: do not invent a tool call that is not present among candidates.".to_string(),
        String::new(),
        "OUTPUT_FORMAT:".to_string(),
        "Do NOT wrap the JSON in markdown fences. Do NOT nest the decision under a 'decision' key.".to_string(),
        "justification is REQUIRED: 1-2 short sentences on why this is the best single next step.".to_string(),
        format!("SCHEMA: {}", judge_schema()),
        String::new(),
        "JSON_ONLY:".to_string(),
    ]
    .join("\n");

    vec![Message::system(system), Message::user(user)]
}

/// 步数耗尽后的收尾：只允许 FINAL
pub fn forced_final_messages(task: &str, state_summary: &str) -> Vec<Message> {
    let system = [
        "You are the JUDGE model for a Universal Self-Consistency (USC) agent.",
        "The step budget is exhausted. No further tool calls are permitted.",
        "Return ONLY a JSON object matching the JudgeDecision schema with decision_type=\"FINAL\".",
    ]
    .join("\n");

    let user = [
        "ORIGINAL_USER_QUERY:".to_string(),
        task.trim().to_string(),
        String::new(),
        "CURRENT_STATE_SUMMARY:".to_string(),
        state_summary.to_string(),
        String::new(),
        "INSTRUCTIONS:".to_string(),
        "Give the best possible final answer using only the observations above.".to_string(),
        "If they are insufficient, say what is known and what could not be resolved.".to_string(),
        "selected_index must be null.".to_string(),
        format!("SCHEMA: {}", judge_schema()),
        String::new(),
        "JSON_ONLY:".to_string(),
    ]
    .join("\n");

    vec![Message::system(system), Message::user(user)]
}

pub fn reflection_messages(
    task: &str,
    tool_name: &str,
    args: &Map<String, Value>,
    input_schema: Option<&Value>,
    failure: &str,
) -> Vec<Message> {
    let system = [
        "You are a REFLECTION model that classifies a failed tool invocation.",
        "Choose RETRY_FIX when the arguments are wrong and you can correct them (return the full fixed_args).",
        "Choose RETRY_WAIT when the failure looks transient (timeouts, 429, 5xx, unavailable).",
        "Choose ABORT when the failure is fatal or cannot be fixed by changing arguments (403, unknown resources).",
        "Return ONLY a JSON object matching the ReflectionDecision schema.",
    ]
    .join("\n");

    let schema = input_schema
        .map(Value::to_string)
        .unwrap_or_else(|| "{}".to_string());
    let user = [
        "ORIGINAL_USER_QUERY:".to_string(),
        task.trim().to_string(),
        String::new(),
        format!("TOOL: {}", tool_name),
        format!("TOOL_INPUT_SCHEMA: {}", schema),
        format!("ARGS: {}", Value::Object(args.clone())),
        format!("ERROR: {}", failure),
        String::new(),
        format!("SCHEMA: {}", reflection_schema()),
        String::new(),
        "JSON_ONLY:".to_string(),
    ]
    .join("\n");

    vec![Message::system(system), Message::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::decision::{Action, ReasonerDecision};

    #[test]
    fn test_schemas_name_required_fields() {
        let s = reasoner_schema();
        assert!(s.contains("brief_rationale"));
        assert!(s.contains("TOOL_CALL"));
        assert!(judge_schema().contains("justification"));
        assert!(reflection_schema().contains("RETRY_WAIT"));
    }

    #[test]
    fn test_reasoner_prompt_carries_context() {
        let msgs = reasoner_messages("Be brief.", "What is 2+2*10?", "step: 1/6", "- name: calculator");
        assert_eq!(msgs.len(), 2);
        let user = &msgs[1].content;
        assert!(user.contains("Be brief."));
        assert!(user.contains("What is 2+2*10?"));
        assert!(user.contains("- name: calculator"));
    }

    #[test]
    fn test_judge_prompt_lists_indexed_candidates() {
        let mut set = CandidateSet::new();
        set.push_valid(
            2,
            ReasonerDecision {
                action: Action::final_answer("22"),
                brief_rationale: "done".to_string(),
                expected_signal: None,
            },
        );
        let msgs = judge_messages("q", "step: 1/6", &set, SelectionStrategy::SelectOne, false);
        let user = &msgs[1].content;
        assert!(user.contains("SELECTION_STRATEGY: select_one"));
        assert!(user.contains("ALLOW_TOOL_SYNTHESIS: false"));
        assert!(user.contains("\"index\":0"));
        assert!(user.contains("\"final_answer\":\"22\""));
    }
}
