//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / input_schema / execute），由 ToolRegistry 按名注册与查找；
//! 启动时注册完毕后只读，可在并发的 reasoner 调用间共享（reasoner 只读 schema，从不执行工具）。
//! 注册时编译一次参数校验器，之后所有校验复用。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::{ArgsValidator, ToolSchema};

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应决策中的 tool_name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 输入 Schema；默认无参数
    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new()
    }

    /// 执行工具；失败时返回描述性错误
    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, String>;
}

struct Registered {
    tool: Arc<dyn Tool>,
    validator: Result<ArgsValidator, String>,
}

/// 工具注册表：按名称有序存储 Arc<dyn Tool>，保证 prompt 中工具顺序稳定
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let validator = tool.input_schema().compile();
        if let Err(e) = &validator {
            tracing::warn!(tool = %name, error = %e, "input schema failed to compile");
        }
        self.tools.insert(
            name,
            Registered {
                tool: Arc::new(tool),
                validator,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|r| r.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名称校验参数；未注册的工具返回 None，schema 编译失败时每次校验都报该错误
    pub fn validate_args(&self, name: &str, args: &Map<String, Value>) -> Option<Vec<String>> {
        self.tools.get(name).map(|r| match &r.validator {
            Ok(v) => v.validate(args),
            Err(e) => vec![e.clone()],
        })
    }

    /// 动态生成工具 schema 列表（name / description / input_schema）
    pub fn to_schema_json(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, r)| {
                json!({
                    "name": name,
                    "description": r.tool.description(),
                    "input_schema": r.tool.input_schema().to_json(),
                })
            })
            .collect();
        Value::Array(tools)
    }

    /// 拼入 prompt 的 AVAILABLE_TOOLS 段落
    pub fn tools_block(&self) -> String {
        self.tools
            .iter()
            .map(|(name, r)| {
                format!(
                    "- name: {}\n  description: {}\n  input_schema: {}",
                    name,
                    r.tool.description(),
                    r.tool.input_schema().to_json()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CalculatorTool, SimpleSearchTool};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        registry.register(SimpleSearchTool::new());
        assert_eq!(registry.tool_names(), vec!["calculator", "simple_search"]);
        assert!(registry.contains("calculator"));
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_validate_args_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        let ok = json!({"expression": "1+1"});
        assert_eq!(
            registry.validate_args("calculator", ok.as_object().unwrap()),
            Some(vec![])
        );
        assert!(registry
            .validate_args("missing", ok.as_object().unwrap())
            .is_none());

        let bad = json!({"expression": 5});
        let errors = registry
            .validate_args("calculator", bad.as_object().unwrap())
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"string\""));
    }

    #[test]
    fn test_tools_block_lists_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);
        let block = registry.tools_block();
        assert!(block.starts_with("- name: calculator"));
        assert!(block.contains("\"required\":[\"expression\"]"));
    }
}
