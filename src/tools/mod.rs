//! 工具箱：Tool trait 与注册表、输入 Schema、执行器，以及内置工具（calculator / simple_search / api_client）

pub mod api_client;
pub mod calculator;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod search;

pub use api_client::ApiClientTool;
pub use calculator::CalculatorTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use schema::{ArgsValidator, ToolSchema, ValueKind};
pub use search::SimpleSearchTool;
