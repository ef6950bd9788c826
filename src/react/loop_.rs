//! USC 主循环
//!
//! PROPOSE（K 路候选）-> ARBITRATE（judge 仲裁）-> ACT（执行唯一工具调用）-> 下一步 PROPOSE，
//! 或仲裁出 FINAL 后进入 DONE。步数超过 max_steps 时做一次只允许 FINAL 的收尾仲裁。
//! 工具失败、模型输出错误都不会中断循环；只有能力整体不可达时返回 AgentError。
//! 可选 event_tx：推送 StepUpdate / Candidates / JudgeDecision / ToolCall / Retry / Observation / TokenUsage / Final。

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::core::{AgentError, LoopPhase, RecoveryEngine};
use crate::llm::TokenCount;
use crate::memory::{Observation, ObservationLog};
use crate::react::action::ActionExecutor;
use crate::react::capability::{
    ArbitrationCapability, ProposalRequest, ReasoningCapability, ReflectionCapability,
};
use crate::react::decision::{Action, CandidateSet, JudgeDecision};
use crate::react::events::{send_event, UscEvent};
use crate::react::judge::{best_effort_answer, Arbitrator};
use crate::react::proposer::CandidateProposer;
use crate::tools::{ToolExecutor, ToolRegistry};

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub final_answer: String,
    pub justification: String,
    /// 最终决策选中的候选下标（合成、兜底或强制收尾时为 None）
    pub selected_index: Option<usize>,
    pub observations: Vec<Observation>,
    /// 实际执行的 PROPOSE 轮数
    pub steps: usize,
    /// 是否因步数耗尽而强制收尾
    pub forced: bool,
    /// 本次运行中 reasoner / judge / reflection 消耗的 token 合计
    pub token_usage: TokenCount,
}

/// 循环内部状态：阶段携带本阶段需要的数据
enum Phase {
    Propose,
    Arbitrate(CandidateSet),
    Act {
        tool_name: String,
        tool_args: Map<String, Value>,
    },
    Done {
        decision: JudgeDecision,
        forced: bool,
    },
}

impl Phase {
    fn label(&self) -> LoopPhase {
        match self {
            Phase::Propose => LoopPhase::Propose,
            Phase::Arbitrate(_) => LoopPhase::Arbitrate,
            Phase::Act { .. } => LoopPhase::Act,
            Phase::Done { .. } => LoopPhase::Done,
        }
    }
}

/// USC Agent：持有配置、工具与三个阶段的执行者；跨步状态只在单次 run 内存在
pub struct UscAgent {
    config: AgentConfig,
    registry: Arc<ToolRegistry>,
    reasoner: Arc<dyn ReasoningCapability>,
    judge: Arc<dyn ArbitrationCapability>,
    reflector: Option<Arc<dyn ReflectionCapability>>,
    proposer: CandidateProposer,
    arbitrator: Arbitrator,
    actions: ActionExecutor,
}

impl UscAgent {
    pub fn new(
        config: AgentConfig,
        registry: Arc<ToolRegistry>,
        reasoner: Arc<dyn ReasoningCapability>,
        judge: Arc<dyn ArbitrationCapability>,
        tool_timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let proposer = CandidateProposer::new(
            reasoner.clone(),
            registry.clone(),
            config.k_paths,
            config.fanout_timeout(),
        )
        .with_trace(config.trace);
        let arbitrator = Arbitrator::new(
            judge.clone(),
            registry.clone(),
            config.selection_strategy,
            config.allow_tool_synthesis,
        )
        .with_trace(config.trace);
        let actions = ActionExecutor::new(
            ToolExecutor::new(registry.clone(), tool_timeout_secs),
            config.tool_result_max_chars,
        );
        Ok(Self {
            config,
            registry,
            reasoner,
            judge,
            reflector: None,
            proposer,
            arbitrator,
            actions,
        })
    }

    /// 安装反思重试；retry.enabled 为 false 时忽略
    pub fn with_reflection(mut self, reflector: Arc<dyn ReflectionCapability>) -> Self {
        if self.config.retry.enabled {
            let engine = RecoveryEngine::new(
                reflector.clone(),
                self.config.retry.max_retries,
                self.config.retry.backoff_seconds,
            );
            self.actions = self.actions.with_failure_handler(Arc::new(engine));
            self.reflector = Some(reflector);
        }
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// 三个能力的累计 token 用量之和
    pub fn token_usage(&self) -> TokenCount {
        let reflection = self
            .reflector
            .as_ref()
            .map(|r| r.token_usage())
            .unwrap_or_default();
        self.reasoner.token_usage() + self.judge.token_usage() + reflection
    }

    pub async fn run(&self, task: &str) -> Result<RunOutcome, AgentError> {
        self.run_with_events(task, None).await
    }

    pub async fn run_with_events(
        &self,
        task: &str,
        event_tx: Option<&UnboundedSender<UscEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("usc_run", run_id = %run_id);
        self.run_inner(run_id.clone(), task, event_tx)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: String,
        task: &str,
        event_tx: Option<&UnboundedSender<UscEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        let max_steps = self.config.max_steps;
        let mut log = ObservationLog::new();
        let mut step = 1usize;
        let mut steps_taken = 0usize;
        let mut phase = Phase::Propose;
        let usage_at_start = self.token_usage();

        tracing::info!(k = self.config.k_paths, max_steps, "run started");

        loop {
            send_event(
                event_tx,
                UscEvent::StepUpdate {
                    step,
                    max_steps,
                    phase: phase.label(),
                },
            );

            phase = match phase {
                Phase::Propose if step > max_steps => {
                    tracing::warn!(max_steps, "step budget exhausted, forcing final answer");
                    let summary = log.summary(max_steps, max_steps);
                    let decision = self
                        .arbitrator
                        .force_final(task, &summary, last_text(&log))
                        .await?;
                    Phase::Done {
                        decision,
                        forced: true,
                    }
                }
                Phase::Propose => {
                    steps_taken += 1;
                    let request = ProposalRequest {
                        system_prompt: self.config.system_prompt.clone(),
                        task: task.to_string(),
                        state_summary: log.summary(step, max_steps),
                        tools_block: self.registry.tools_block(),
                    };
                    let candidates = self.proposer.propose(&request).await?;
                    tracing::info!(
                        step,
                        valid = candidates.len(),
                        rejected = candidates.rejected().len(),
                        "candidates"
                    );
                    if event_tx.is_some() {
                        send_event(
                            event_tx,
                            UscEvent::Candidates {
                                step,
                                valid: serde_json::to_value(candidates.candidates())
                                    .unwrap_or(Value::Null),
                                rejected: serde_json::to_value(candidates.rejected())
                                    .unwrap_or(Value::Null),
                            },
                        );
                    }
                    Phase::Arbitrate(candidates)
                }
                Phase::Arbitrate(candidates) => {
                    let summary = log.summary(step, max_steps);
                    let decision = self
                        .arbitrator
                        .arbitrate(task, &summary, last_text(&log), &candidates)
                        .await?;
                    tracing::info!(
                        step,
                        decision = decision.action.kind(),
                        selected_index = ?decision.selected_index,
                        "judge"
                    );
                    send_event(
                        event_tx,
                        UscEvent::JudgeDecision {
                            step,
                            decision: serde_json::to_value(&decision).unwrap_or(Value::Null),
                        },
                    );
                    match decision.action {
                        Action::ToolCall {
                            tool_name,
                            tool_args,
                        } => Phase::Act {
                            tool_name,
                            tool_args,
                        },
                        action @ Action::Final { .. } => Phase::Done {
                            decision: JudgeDecision { action, ..decision },
                            forced: false,
                        },
                    }
                }
                Phase::Act {
                    tool_name,
                    tool_args,
                } => {
                    send_event(
                        event_tx,
                        UscEvent::ToolCall {
                            tool: tool_name.clone(),
                            args: Value::Object(tool_args.clone()),
                        },
                    );
                    let outcome = self
                        .actions
                        .execute(step, task, &tool_name, &tool_args)
                        .await;
                    for attempt in &outcome.retry_history {
                        send_event(
                            event_tx,
                            UscEvent::Retry {
                                tool: tool_name.clone(),
                                attempt: attempt.attempt,
                                outcome: attempt.outcome.to_string(),
                                explanation: attempt.explanation.clone(),
                            },
                        );
                    }
                    let observation = outcome.observation;
                    tracing::info!(
                        step,
                        tool = %tool_name,
                        success = observation.success,
                        retries = observation.retries,
                        "observation"
                    );
                    send_event(
                        event_tx,
                        UscEvent::Observation {
                            tool: tool_name,
                            success: observation.success,
                            retries: observation.retries,
                            text: observation.text.clone(),
                        },
                    );
                    log.push(observation);
                    step += 1;
                    Phase::Propose
                }
                Phase::Done { decision, forced } => {
                    let final_answer = match &decision.action {
                        Action::Final { final_answer } => final_answer.clone(),
                        // Done 只由 FINAL 决策进入
                        Action::ToolCall { .. } => best_effort_answer(last_text(&log)),
                    };
                    let token_usage = self.token_usage().since(usage_at_start);
                    tracing::info!(
                        steps = steps_taken,
                        forced,
                        prompt_tokens = token_usage.prompt_tokens,
                        completion_tokens = token_usage.completion_tokens,
                        total_tokens = token_usage.total_tokens,
                        "run finished"
                    );
                    send_event(
                        event_tx,
                        UscEvent::TokenUsage {
                            prompt_tokens: token_usage.prompt_tokens,
                            completion_tokens: token_usage.completion_tokens,
                            total_tokens: token_usage.total_tokens,
                        },
                    );
                    send_event(
                        event_tx,
                        UscEvent::Final {
                            answer: final_answer.clone(),
                            forced,
                        },
                    );
                    return Ok(RunOutcome {
                        run_id,
                        final_answer,
                        justification: decision.justification,
                        selected_index: decision.selected_index,
                        observations: log.entries().to_vec(),
                        steps: steps_taken,
                        forced,
                        token_usage,
                    });
                }
            };
        }
    }
}

fn last_text(log: &ObservationLog) -> Option<&str> {
    log.last().map(|o| o.text.as_str())
}
