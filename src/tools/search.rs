//! 简易检索工具：在内置的小型知识库中做子串 / 词元匹配
//!
//! 无匹配时按查询与键的词元重合数取前两条，保证总有结果返回。

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolSchema, ValueKind};

/// 无直接命中时返回的条数
const FALLBACK_HITS: usize = 2;

/// 内置知识库检索工具
pub struct SimpleSearchTool {
    corpus: BTreeMap<String, String>,
    word_re: Regex,
}

impl SimpleSearchTool {
    pub fn new() -> Self {
        let corpus = [
            (
                "react",
                "ReAct interleaves reasoning with tool use, producing observations that feed back into the loop.",
            ),
            (
                "self-consistency",
                "Self-consistency samples multiple reasoning paths and picks the most consistent result.",
            ),
            (
                "usc",
                "Universal Self-Consistency: sample K candidate next steps, then pick/synthesize ONE action to execute.",
            ),
            (
                "tool calling",
                "Tool calling uses structured function invocation (name + JSON args) instead of parsing freeform text.",
            ),
        ];
        Self::with_corpus(corpus.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    pub fn with_corpus(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            corpus: entries.into_iter().collect(),
            // 字面量正则，编译不会失败
            word_re: Regex::new(r"[a-z]+").expect("static regex"),
        }
    }

    fn words(&self, text: &str, min_len: usize) -> HashSet<String> {
        self.word_re
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .filter(|w| w.len() >= min_len)
            .collect()
    }

    fn search(&self, query: &str) -> Vec<(String, String)> {
        let q = query.to_lowercase();
        let tokens: Vec<&str> = q.split_whitespace().collect();

        let hits: Vec<(String, String)> = self
            .corpus
            .iter()
            .filter(|(key, _)| q.contains(key.as_str()) || tokens.iter().any(|t| key.contains(t)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !hits.is_empty() {
            return hits;
        }

        let query_words = self.words(&q, 3);
        let mut scored: Vec<(usize, &String)> = self
            .corpus
            .keys()
            .map(|key| (self.words(key, 1).intersection(&query_words).count(), key))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(a.1)));
        scored
            .into_iter()
            .take(FALLBACK_HITS)
            .map(|(_, key)| (key.clone(), self.corpus[key].clone()))
            .collect()
    }
}

impl Default for SimpleSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SimpleSearchTool {
    fn name(&self) -> &str {
        "simple_search"
    }

    fn description(&self) -> &str {
        "Search a tiny in-memory knowledge base and return matching snippets."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new().required("query", ValueKind::String, "Search query")
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "query must be a string".to_string())?;
        let matches: Vec<Value> = self
            .search(query)
            .into_iter()
            .map(|(key, value)| json!({"key": key, "value": value}))
            .collect();
        Ok(json!({"query": query.to_lowercase(), "matches": matches}))
    }
}
