//! Candidate Proposer：一步内并发发起 K 次 reasoner 调用，归一化、校验后组成 CandidateSet
//!
//! 所有调用共享一个截止时间；超时、出错、校验失败的调用只是被丢弃，不会中断这一步。
//! 只有当 K 次调用全部「不可达」时才视为致命。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};

use crate::core::AgentError;
use crate::react::capability::{ProposalRequest, ReasoningCapability};
use crate::react::decision::CandidateSet;
use crate::react::normalize::normalize_reasoner;
use crate::react::validate::validate_reasoner;
use crate::tools::ToolRegistry;

pub struct CandidateProposer {
    reasoner: Arc<dyn ReasoningCapability>,
    registry: Arc<ToolRegistry>,
    k: usize,
    timeout: Duration,
    trace: bool,
}

impl CandidateProposer {
    pub fn new(
        reasoner: Arc<dyn ReasoningCapability>,
        registry: Arc<ToolRegistry>,
        k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            reasoner,
            registry,
            k,
            timeout,
            trace: false,
        }
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// 生成本步候选；结果按调用序号排列，与完成先后无关
    pub async fn propose(&self, request: &ProposalRequest) -> Result<CandidateSet, AgentError> {
        let deadline = Instant::now() + self.timeout;
        let calls = (0..self.k).map(|path_id| async move {
            let result = timeout_at(deadline, self.reasoner.propose(request)).await;
            (path_id, result)
        });
        let results = join_all(calls).await;

        let tool_names = self.registry.tool_names();
        let mut set = CandidateSet::new();
        let mut unreachable = 0;
        let mut last_unreachable = String::new();

        for (path_id, result) in results {
            let raw = match result {
                Err(_) => {
                    set.push_rejected(path_id, format!("timed out after {:?}", self.timeout));
                    continue;
                }
                Ok(Err(e)) => {
                    if e.is_unreachable() {
                        unreachable += 1;
                        last_unreachable = e.to_string();
                    }
                    set.push_rejected(path_id, e.to_string());
                    continue;
                }
                Ok(Ok(raw)) => raw,
            };

            let normalized = normalize_reasoner(&raw, &tool_names);
            match validate_reasoner(&normalized, &self.registry) {
                Ok(decision) => {
                    if self.trace {
                        tracing::info!(path_id, decision = %serde_json::to_string(&decision).unwrap_or_default(), "candidate accepted");
                    }
                    set.push_valid(path_id, decision);
                }
                Err(errors) => {
                    let reason = errors.join("; ");
                    if self.trace {
                        tracing::info!(path_id, raw = %raw, reason = %reason, "candidate rejected");
                    }
                    set.push_rejected(path_id, reason);
                }
            }
        }

        if self.k > 0 && unreachable == self.k {
            tracing::error!(k = self.k, "all reasoner calls unreachable");
            return Err(AgentError::CapabilityUnavailable(format!(
                "all {} reasoner calls unreachable: {}",
                self.k, last_unreachable
            )));
        }

        tracing::debug!(
            valid = set.len(),
            rejected = set.rejected().len(),
            "candidates proposed"
        );
        Ok(set)
    }
}
