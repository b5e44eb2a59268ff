//! 编排层：流式工具调用拼装、过程事件、对话主循环

pub mod accumulator;
pub mod events;
pub mod loop_;

pub use accumulator::{fresh_call_id, ToolCallAccumulator};
pub use events::ReactEvent;
pub use loop_::{ConversationOrchestrator, TurnLimits};
