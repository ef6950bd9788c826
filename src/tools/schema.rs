//! 工具输入 Schema：用 builder 声明必填键与每个键的基础类型，渲染为 JSON Schema
//!
//! 校验交给 jsonschema：注册工具时把 to_json() 编译为 ArgsValidator，
//! 候选校验、Judge 输出校验与执行前复检共用同一个编译结果。

use std::collections::BTreeMap;

use jsonschema::{validator_for, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 参数的基础类型（JSON Schema 的 type 关键字）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    /// 整数或浮点（布尔值不算数字）
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
    /// 不做类型约束
    Any,
}

impl ValueKind {
    fn type_keyword(self) -> Option<&'static str> {
        match self {
            ValueKind::String => Some("string"),
            ValueKind::Number => Some("number"),
            ValueKind::Integer => Some("integer"),
            ValueKind::Boolean => Some("boolean"),
            ValueKind::Object => Some("object"),
            ValueKind::Array => Some("array"),
            ValueKind::Null => Some("null"),
            ValueKind::Any => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Param {
    kind: ValueKind,
    description: Option<String>,
}

/// 工具输入 Schema
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolSchema {
    required: Vec<String>,
    properties: BTreeMap<String, Param>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明必填参数
    pub fn required(mut self, name: &str, kind: ValueKind, description: &str) -> Self {
        self.required.push(name.to_string());
        self.optional(name, kind, description)
    }

    /// 声明可选参数
    pub fn optional(mut self, name: &str, kind: ValueKind, description: &str) -> Self {
        let description = if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        };
        self.properties
            .insert(name.to_string(), Param { kind, description });
        self
    }

    /// 渲染为 JSON Schema，拼入 prompt 并用于编译校验器
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, param)| {
                let mut prop = Map::new();
                if let Some(ty) = param.kind.type_keyword() {
                    prop.insert("type".to_string(), json!(ty));
                }
                if let Some(desc) = &param.description {
                    prop.insert("description".to_string(), json!(desc));
                }
                (name.clone(), Value::Object(prop))
            })
            .collect();
        json!({
            "type": "object",
            "required": self.required,
            "properties": properties,
        })
    }

    /// 编译为参数校验器
    pub fn compile(&self) -> Result<ArgsValidator, String> {
        let validator =
            validator_for(&self.to_json()).map_err(|e| format!("invalid input schema: {}", e))?;
        Ok(ArgsValidator { validator })
    }
}

/// 编译后的参数校验器
pub struct ArgsValidator {
    validator: Validator,
}

impl ArgsValidator {
    /// 校验参数对象，返回全部错误（为空即通过）
    pub fn validate(&self, args: &Map<String, Value>) -> Vec<String> {
        let instance = Value::Object(args.clone());
        self.validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_schema() -> ToolSchema {
        ToolSchema::new()
            .required("endpoint", ValueKind::String, "API endpoint path")
            .required("method", ValueKind::String, "")
            .optional("params", ValueKind::Object, "Query parameters or body data")
    }

    fn check(schema: &ToolSchema, v: Value) -> Vec<String> {
        schema
            .compile()
            .unwrap()
            .validate(&v.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_valid_args() {
        assert!(check(&api_schema(), json!({"endpoint": "/health", "method": "GET"})).is_empty());
    }

    #[test]
    fn test_missing_and_mistyped() {
        let errors = check(&api_schema(), json!({"endpoint": 1, "params": "x"}));
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("\"method\"")));
        assert!(errors.iter().any(|e| e.contains("\"string\"")));
        assert!(errors.iter().any(|e| e.contains("\"object\"")));
    }

    #[test]
    fn test_number_accepts_integer_not_bool() {
        let schema = ToolSchema::new().required("x", ValueKind::Number, "");
        assert!(check(&schema, json!({"x": 3})).is_empty());
        assert!(check(&schema, json!({"x": 3.5})).is_empty());
        assert_eq!(check(&schema, json!({"x": true})).len(), 1);
    }

    #[test]
    fn test_any_and_extra_keys_unconstrained() {
        let schema = ToolSchema::new()
            .required("expression", ValueKind::String, "")
            .optional("payload", ValueKind::Any, "");
        assert!(check(&schema, json!({"expression": "1+1", "payload": [1], "note": 1})).is_empty());
    }

    #[test]
    fn test_to_json_shape() {
        let v = ToolSchema::new()
            .required("endpoint", ValueKind::String, "API endpoint path")
            .required("method", ValueKind::String, "")
            .optional("body", ValueKind::Any, "")
            .to_json();
        assert_eq!(v["type"], "object");
        assert_eq!(v["required"], json!(["endpoint", "method"]));
        assert!(v["properties"]["body"].get("type").is_none());
        assert!(v["properties"]["method"].get("description").is_none());
    }
}
