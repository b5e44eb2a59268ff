//! 核心层：错误类型、编排状态、Agent 构建器

pub mod builder;
pub mod error;
pub mod state;

pub use builder::{AgentBuilder, DEFAULT_SYSTEM_PROMPT};
pub use error::{AgentError, ToolError};
pub use state::TurnState;
