//! 校验：把归一化后的 JSON 转为强类型决策，任何不满足约束的候选在这里被拒绝
//!
//! 校验分两层：结构（字段与类型）和动作（工具已注册、参数满足 Schema）。
//! judge 输出只做结构校验，动作校验在 Arbitrator 应用合成策略之后进行。

use serde_json::{Map, Value};

use crate::core::RecoveryAction;
use crate::react::decision::{Action, JudgeDecision, ReasonerDecision};
use crate::tools::ToolRegistry;

/// 校验 reasoner 候选：结构 + 动作
pub fn validate_reasoner(
    raw: &Value,
    registry: &ToolRegistry,
) -> Result<ReasonerDecision, Vec<String>> {
    let obj = raw
        .as_object()
        .ok_or_else(|| vec!["Output is not a JSON object".to_string()])?;

    let action = parse_action(obj)?;
    let errors = check_action(&action, registry);
    if !errors.is_empty() {
        return Err(errors);
    }

    let brief_rationale = non_empty_str(obj, "brief_rationale")
        .ok_or_else(|| vec!["brief_rationale must be a non-empty string".to_string()])?;
    let expected_signal = non_empty_str(obj, "expected_signal");

    Ok(ReasonerDecision {
        action,
        brief_rationale,
        expected_signal,
    })
}

/// 结构校验 judge 输出；selected_index 原样保留，是否越界由 Arbitrator 判断
pub fn parse_judge(raw: &Value) -> Result<JudgeDecision, Vec<String>> {
    let obj = raw
        .as_object()
        .ok_or_else(|| vec!["Output is not a JSON object".to_string()])?;
    let action = parse_action(obj)?;

    let selected_index = obj
        .get("selected_index")
        .and_then(Value::as_u64)
        .map(|i| i as usize);
    let justification = non_empty_str(obj, "justification")
        .ok_or_else(|| vec!["justification must be a non-empty string".to_string()])?;
    let brief_rationale =
        non_empty_str(obj, "brief_rationale").unwrap_or_else(|| justification.clone());

    Ok(JudgeDecision {
        action,
        selected_index,
        justification,
        brief_rationale,
    })
}

/// 动作层校验：TOOL_CALL 必须指向已注册工具且参数满足其 Schema；FINAL 总是合法
pub fn check_action(action: &Action, registry: &ToolRegistry) -> Vec<String> {
    match action {
        Action::ToolCall {
            tool_name,
            tool_args,
        } => match registry.validate_args(tool_name, tool_args) {
            Some(errors) => errors,
            None => vec![format!("Unknown tool: {}", tool_name)],
        },
        Action::Final { .. } => Vec::new(),
    }
}

/// reflection 分类；无法识别的 outcome 或缺少 fixed_args 的 RETRY_FIX 返回 None（调用方按 ABORT 处理）
pub fn parse_reflection(raw: &Value) -> Option<(RecoveryAction, String)> {
    let obj = raw.as_object()?;
    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let action = match obj.get("outcome").and_then(Value::as_str)? {
        "RETRY_FIX" => RecoveryAction::RetryFix(obj.get("fixed_args")?.as_object()?.clone()),
        "RETRY_WAIT" => RecoveryAction::RetryWait,
        "ABORT" => RecoveryAction::Abort,
        _ => return None,
    };
    Some((action, explanation))
}

fn parse_action(obj: &Map<String, Value>) -> Result<Action, Vec<String>> {
    match obj.get("decision_type").and_then(Value::as_str) {
        Some("TOOL_CALL") => {
            let mut errors = Vec::new();
            let tool_name = non_empty_str(obj, "tool_name");
            if tool_name.is_none() {
                errors.push("TOOL_CALL requires tool_name".to_string());
            }
            let tool_args = match obj.get("tool_args") {
                Some(Value::Object(m)) => Some(m.clone()),
                None | Some(Value::Null) => Some(Map::new()),
                _ => {
                    errors.push("TOOL_CALL tool_args must be an object or null".to_string());
                    None
                }
            };
            match (tool_name, tool_args) {
                (Some(name), Some(args)) => Ok(Action::tool_call(name, args)),
                _ => Err(errors),
            }
        }
        Some("FINAL") => non_empty_str(obj, "final_answer")
            .map(Action::final_answer)
            .ok_or_else(|| vec!["FINAL requires a non-empty final_answer".to_string()]),
        Some(other) => Err(vec![format!("Unknown decision_type: {}", other)]),
        None => Err(vec!["Missing decision_type".to_string()]),
    }
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
