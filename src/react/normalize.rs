//! 归一化：把模型的「差不多对」的输出修成可校验的形状
//!
//! 所有修复启发式都集中在这里，且永不失败：修不动就原样返回，交给 validate 拒绝。
//! 输入是原始 payload（JSON 对象，或包含 JSON 的自由文本），输出是修复后的 JSON 值。

use std::collections::HashSet;

use serde_json::{Map, Value};

/// 视为「未填写」的占位文本
const PLACEHOLDERS: [&str; 4] = ["", "N/A", "NA", "NONE"];
/// 编辑距离吸附的最大距离
const MAX_TOOL_EDIT_DISTANCE: usize = 2;

/// 从自由文本中提取第一个 JSON 对象：整体解析 -> 二次解析被字符串包裹的 JSON -> 截取首个 '{' 到末个 '}'
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(cleaned) {
        match v {
            Value::Object(m) => return Some(m),
            Value::String(inner) => return extract_json_object(&inner),
            _ => {}
        }
    }
    // 兼容 ```json ... ``` 围栏与前后说明文字
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(m)) => Some(m),
        _ => None,
    }
}

/// 原始 payload 转为 JSON 对象；字符串按文本提取
pub fn coerce_object(raw: &Value) -> Option<Map<String, Value>> {
    match raw {
        Value::Object(m) => Some(m.clone()),
        Value::String(s) => extract_json_object(s),
        _ => None,
    }
}

/// reasoner 候选归一化
pub fn normalize_reasoner(raw: &Value, tool_names: &[String]) -> Value {
    let Some(mut obj) = coerce_object(raw) else {
        return raw.clone();
    };
    flatten_nested_decision(&mut obj);
    normalize_decision_fields(&mut obj, tool_names);

    if is_placeholder(obj.get("brief_rationale")) {
        let filler = match decision_type(&obj) {
            Some("TOOL_CALL") => format!(
                "Use {} to gather the missing information/result needed to proceed.",
                tool_label(&obj)
            ),
            _ => "We have enough information from observations to answer now.".to_string(),
        };
        obj.insert("brief_rationale".to_string(), Value::String(filler));
    }
    Value::Object(obj)
}

/// judge 输出归一化：在 reasoner 规则之外修复 selected_index 与 justification
pub fn normalize_judge(raw: &Value, tool_names: &[String]) -> Value {
    let Some(mut obj) = coerce_object(raw) else {
        return raw.clone();
    };
    flatten_nested_decision(&mut obj);
    normalize_decision_fields(&mut obj, tool_names);

    let index = obj
        .get("selected_index")
        .map(coerce_index)
        .unwrap_or(Value::Null);
    obj.insert("selected_index".to_string(), index);

    if is_placeholder(obj.get("justification")) {
        let borrowed = obj
            .get("brief_rationale")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let justification = borrowed.unwrap_or_else(|| match decision_type(&obj) {
            Some("TOOL_CALL") => format!(
                "Select {} because it is the most direct next action to reduce uncertainty.",
                tool_label(&obj)
            ),
            _ => "Select FINAL because the observations are sufficient to answer.".to_string(),
        });
        obj.insert("justification".to_string(), Value::String(justification));
    }
    Value::Object(obj)
}

/// reflection 分类归一化：字段别名与 outcome 同义词
pub fn normalize_reflection(raw: &Value) -> Value {
    let Some(mut obj) = coerce_object(raw) else {
        return raw.clone();
    };
    alias_key(&mut obj, "outcome", &["verdict", "decision", "classification"]);
    alias_key(&mut obj, "fixed_args", &["retry_args", "corrected_args", "args"]);
    alias_key(
        &mut obj,
        "explanation",
        &["analysis", "abort_suggestion", "reason", "rationale"],
    );

    if let Some(Value::String(s)) = obj.get("outcome") {
        let canonical = match upper_snake(s).as_str() {
            "RETRY_FIX" | "RETRY" | "FIX" | "REPAIR" => Some("RETRY_FIX"),
            "RETRY_WAIT" | "WAIT" | "BACKOFF" | "DELAY" => Some("RETRY_WAIT"),
            "ABORT" | "STOP" | "FAIL" => Some("ABORT"),
            _ => None,
        };
        if let Some(c) = canonical {
            obj.insert("outcome".to_string(), Value::String(c.to_string()));
        }
    }
    reparse_object_field(&mut obj, "fixed_args");
    if !obj.get("explanation").map(Value::is_string).unwrap_or(false) {
        obj.insert("explanation".to_string(), Value::String(String::new()));
    }
    Value::Object(obj)
}

/// {"decision": {...}, "justification": ...} -> 展平，内层字段优先
fn flatten_nested_decision(obj: &mut Map<String, Value>) {
    let nested = match obj.get("decision") {
        Some(Value::Object(m)) => Some(m.clone()),
        Some(Value::String(s)) => extract_json_object(s),
        _ => None,
    };
    if let Some(nested) = nested {
        obj.remove("decision");
        for (k, v) in nested {
            obj.insert(k, v);
        }
    }
}

fn normalize_decision_fields(obj: &mut Map<String, Value>, tool_names: &[String]) {
    alias_key(obj, "decision_type", &["type", "action", "kind"]);
    alias_key(obj, "tool_name", &["tool", "name"]);
    alias_key(obj, "tool_args", &["args", "arguments", "parameters", "input"]);

    for key in ["tool_name", "final_answer", "expected_signal"] {
        if obj.get(key).and_then(|v| v.as_str()) == Some("") {
            obj.insert(key.to_string(), Value::Null);
        }
    }

    let dt = obj
        .get("decision_type")
        .and_then(|v| v.as_str())
        .and_then(|s| canonical_decision_type(s));
    let has_tool = obj.get("tool_name").map(Value::is_string).unwrap_or(false);
    let dt = dt.or(if has_tool { Some("TOOL_CALL") } else { None });

    // 最终答案可能藏在非预期的键下
    if dt != Some("TOOL_CALL") && obj.get("final_answer").map(Value::is_null).unwrap_or(true) {
        alias_key(obj, "final_answer", &["answer", "final", "response", "result", "output"]);
    }
    let has_final = obj.get("final_answer").map(|v| !v.is_null()).unwrap_or(false);
    let dt = dt.or(if has_final { Some("FINAL") } else { None });
    if let Some(dt) = dt {
        obj.insert("decision_type".to_string(), Value::String(dt.to_string()));
    }

    reparse_object_field(obj, "tool_args");

    if let Some(Value::String(name)) = obj.get("tool_name") {
        if let Some(snapped) = snap_tool_name(name, tool_names) {
            obj.insert("tool_name".to_string(), Value::String(snapped));
        }
    }

    match dt {
        Some("TOOL_CALL") => {
            obj.remove("final_answer");
        }
        Some("FINAL") => {
            obj.remove("tool_name");
            obj.remove("tool_args");
            // 非字符串答案（数字、对象）转为文本
            if let Some(v) = obj.get("final_answer") {
                if !v.is_string() && !v.is_null() {
                    let text = v.to_string();
                    obj.insert("final_answer".to_string(), Value::String(text));
                }
            }
        }
        _ => {}
    }
}

fn canonical_decision_type(s: &str) -> Option<&'static str> {
    match upper_snake(s).as_str() {
        "TOOL_CALL" | "TOOL" | "TOOLCALL" | "CALL_TOOL" | "TOOL_USE" => Some("TOOL_CALL"),
        "FINAL" | "ANSWER" | "FINAL_ANSWER" | "RESPOND" => Some("FINAL"),
        _ => None,
    }
}

fn decision_type(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("decision_type").and_then(|v| v.as_str())
}

fn tool_label(obj: &Map<String, Value>) -> String {
    obj.get("tool_name")
        .and_then(|v| v.as_str())
        .unwrap_or("a tool")
        .to_string()
}

fn upper_snake(s: &str) -> String {
    s.trim().to_uppercase().replace([' ', '-'], "_")
}

/// canonical 键缺失或为 null 时，用第一个存在的别名填充并移除别名
fn alias_key(obj: &mut Map<String, Value>, canonical: &str, aliases: &[&str]) {
    if obj.get(canonical).map(|v| !v.is_null()).unwrap_or(false) {
        return;
    }
    for alias in aliases {
        if let Some(v) = obj.get(*alias) {
            if v.is_null() {
                continue;
            }
            let v = v.clone();
            obj.remove(*alias);
            obj.insert(canonical.to_string(), v);
            return;
        }
    }
}

/// 字段是被字符串化的 JSON 对象时做第二次解析；空串视为 null
fn reparse_object_field(obj: &mut Map<String, Value>, key: &str) {
    let replacement = match obj.get(key) {
        Some(Value::String(s)) if s.trim().is_empty() => Some(Value::Null),
        Some(Value::String(s)) => extract_json_object(s).map(Value::Object),
        _ => None,
    };
    if let Some(v) = replacement {
        obj.insert(key.to_string(), v);
    }
}

fn is_placeholder(v: Option<&Value>) -> bool {
    match v {
        Some(Value::String(s)) => PLACEHOLDERS.contains(&s.trim().to_uppercase().as_str()),
        _ => true,
    }
}

/// selected_index 容错：整数保留，整值浮点与数字字符串转整数，其余（负数、布尔、对象等）为 null
fn coerce_index(v: &Value) -> Value {
    match v {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::from(u)
            } else if let Some(f) = n.as_f64() {
                if f >= 0.0 && f.fract() == 0.0 && f < u32::MAX as f64 {
                    Value::from(f as u64)
                } else {
                    Value::Null
                }
            } else {
                Value::Null
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn canonical_tool(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// 把接近某个已注册工具的名字吸附过去：规范化后相等 > 唯一的小编辑距离 > 唯一的共享词元
pub fn snap_tool_name(name: &str, tool_names: &[String]) -> Option<String> {
    if tool_names.iter().any(|t| t == name) {
        return Some(name.to_string());
    }
    let canon = canonical_tool(name);
    if canon.is_empty() {
        return None;
    }

    if let Some(t) = unique(tool_names.iter().filter(|t| canonical_tool(t) == canon)) {
        return Some(t.clone());
    }

    if canon.len() > 3 {
        let distances: Vec<(usize, &String)> = tool_names
            .iter()
            .map(|t| (levenshtein(&canon, &canonical_tool(t)), t))
            .filter(|(d, _)| *d <= MAX_TOOL_EDIT_DISTANCE)
            .collect();
        if let Some(min) = distances.iter().map(|(d, _)| *d).min() {
            if let Some((_, t)) = unique(distances.iter().filter(|(d, _)| *d == min)) {
                return Some((*t).clone());
            }
        }
    }

    let tokens: HashSet<&str> = canon.split('_').filter(|t| t.len() >= 3).collect();
    if tokens.is_empty() {
        return None;
    }
    unique(tool_names.iter().filter(|t| {
        canonical_tool(t)
            .split('_')
            .any(|tok| tokens.contains(tok))
    }))
    .cloned()
}

fn unique<T>(mut iter: impl Iterator<Item = T>) -> Option<T> {
    let first = iter.next()?;
    if iter.next().is_some() {
        return None;
    }
    Some(first)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
