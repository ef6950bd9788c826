//! 观察日志：每执行一次工具追加一条，只增不减
//!
//! 仅由主循环持有并写入；reasoner / judge 通过 summary() 得到最近 10 条的文本摘要。

use serde::Serialize;

/// 摘要中保留的最近观察条数
const SUMMARY_WINDOW: usize = 10;
/// 截断后缀预留长度（"... [truncated N chars]"）
const TRUNCATE_SUFFIX_RESERVE: usize = 24;

/// 单条观察：工具结果或错误描述
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    /// 产生该观察的步数（从 1 开始）
    pub step: usize,
    pub tool: String,
    pub success: bool,
    /// 本次调用经历的重试次数（未重试为 0）
    pub retries: u32,
    pub text: String,
}

/// 只追加的观察日志
#[derive(Clone, Debug, Default, Serialize)]
pub struct ObservationLog {
    entries: Vec<Observation>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observation: Observation) {
        self.entries.push(observation);
    }

    pub fn entries(&self) -> &[Observation] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Observation> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 构建供 prompt 使用的状态摘要：当前步数 + 最近观察（最新在后）
    pub fn summary(&self, step: usize, max_steps: usize) -> String {
        let obs_lines = if self.entries.is_empty() {
            "- (none)".to_string()
        } else {
            let start = self.entries.len().saturating_sub(SUMMARY_WINDOW);
            self.entries[start..]
                .iter()
                .map(|o| format!("- {}", o.text))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "step: {}/{}\nobservations (most recent last):\n{}",
            step, max_steps, obs_lines
        )
    }
}

/// 按字符截断；超长时保留前 max_chars-24 个字符并附上原长度
pub fn truncate(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATE_SUFFIX_RESERVE);
    let head: String = s.chars().take(keep).collect();
    format!("{}... [truncated {} chars]", head, total)
}
