//! 记忆层：LLM 消息与单次运行内的观察日志（无跨会话记忆、无持久化）

pub mod message;
pub mod observation;

pub use message::{Message, Role};
pub use observation::{truncate, Observation, ObservationLog};
