//! USC 认知层：候选生成、仲裁、执行与主循环
//!
//! decision / normalize / validate 负责把模型输出变成强类型决策；
//! proposer -> judge -> action 是一步内的三个阶段，由 loop_ 串起来。

pub mod action;
pub mod capability;
pub mod decision;
pub mod events;
pub mod judge;
pub mod loop_;
pub mod normalize;
pub mod prompts;
pub mod proposer;
pub mod validate;

pub use action::{ActionExecutor, ActionOutcome};
pub use capability::{
    ArbitrationCapability, ArbitrationRequest, LlmJudge, LlmReasoner, LlmReflector,
    ProposalRequest, ReasoningCapability, ReflectionCapability, ReflectionRequest,
};
pub use decision::{Action, CandidateSet, JudgeDecision, ReasonerDecision, RejectedCandidate};
pub use events::UscEvent;
pub use judge::Arbitrator;
pub use loop_::{RunOutcome, UscAgent};
pub use proposer::CandidateProposer;
