//! 编排过程事件：供 CLI 详细模式等前端实时展示文本与工具调用

use serde::Serialize;

use crate::core::TurnState;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 模型文本片段（按到达顺序）
    TextChunk { text: String },
    /// 已拼装完成、即将执行的工具调用
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// 工具结果（rendered 为发回模型的文本）
    ToolResult {
        call_id: String,
        rendered: String,
        is_error: bool,
    },
    StateChange { state: TurnState },
    /// 本条用户消息处理完毕
    TurnComplete { rounds: usize },
}
