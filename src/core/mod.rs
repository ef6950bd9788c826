//! 核心层：错误类型、状态定义、反思重试引擎、Agent 构建器

pub mod builder;
pub mod error;
pub mod recovery;
pub mod state;

pub use builder::{create_agent_builder, AgentBuilder};
pub use error::{AgentError, CapabilityError, RecoveryAction, ToolFailure};
pub use recovery::{
    backoff_delay, RecoveryEngine, RecoveryFailure, RecoveryReport, RetryAttempt, ToolFailureHandler,
};
pub use state::{LoopPhase, RetryPhase, RetryState};
