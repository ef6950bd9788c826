//! 状态定义：主循环阶段与单次工具调用的重试状态
//!
//! LoopPhase 仅用于事件/日志投影；真正的状态迁移在 react::loop_ 中由 match 驱动。

use serde::Serialize;

use crate::core::RecoveryAction;

/// 主循环阶段：PROPOSE -> ARBITRATE -> (ACT -> PROPOSE) | DONE
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    Propose,
    Arbitrate,
    Act,
    Done,
}

/// 反思重试状态机：FAILED -> CLASSIFYING -> RETRY_FIX | RETRY_WAIT | ABORT
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryPhase {
    Failed,
    Classifying,
    RetryFix,
    RetryWait,
    Abort,
}

/// 单次工具调用的重试状态：首次失败时创建，成功 / 耗尽 / ABORT 时丢弃
#[derive(Clone, Debug)]
pub struct RetryState {
    /// 已发起的重试次数（不含首次调用）
    pub attempt: u32,
    pub last_failure: String,
    pub phase: RetryPhase,
    pub last_outcome: Option<RecoveryAction>,
}

impl RetryState {
    pub fn new(failure: impl Into<String>) -> Self {
        Self {
            attempt: 0,
            last_failure: failure.into(),
            phase: RetryPhase::Failed,
            last_outcome: None,
        }
    }

    /// 记录一次分类结果并进入对应阶段
    pub fn classified(&mut self, action: &RecoveryAction) {
        self.phase = match action {
            RecoveryAction::RetryFix(_) => RetryPhase::RetryFix,
            RecoveryAction::RetryWait => RetryPhase::RetryWait,
            RecoveryAction::Abort => RetryPhase::Abort,
        };
        self.last_outcome = Some(action.clone());
    }

    /// 重试再次失败：计数已在发起时递增，这里只更新描述并回到 FAILED
    pub fn failed_again(&mut self, failure: impl Into<String>) {
        self.last_failure = failure.into();
        self.phase = RetryPhase::Failed;
    }

    pub fn exhausted(&self, max_retries: u32) -> bool {
        self.attempt >= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_state_lifecycle() {
        let mut state = RetryState::new("503 Service Unavailable");
        assert_eq!(state.phase, RetryPhase::Failed);
        assert!(!state.exhausted(1));

        state.classified(&RecoveryAction::RetryWait);
        assert_eq!(state.phase, RetryPhase::RetryWait);
        state.attempt += 1;
        state.failed_again("503 again");
        assert_eq!(state.phase, RetryPhase::Failed);
        assert_eq!(state.last_failure, "503 again");
        assert!(state.exhausted(1));
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        assert!(RetryState::new("boom").exhausted(0));
    }
}
