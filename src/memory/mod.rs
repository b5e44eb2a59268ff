//! 记忆层：本轮对话的有序消息日志（仅内存，不做持久化）

pub mod conversation;

pub use conversation::{
    arguments_display, ContentItem, ConversationLog, Message, Role, ToolCallRequest,
    ToolCallResult,
};
