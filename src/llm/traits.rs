//! LLM 客户端抽象
//!
//! 核心只依赖「有序消息日志 + 工具描述符 → 响应片段流」这一契约，不依赖具体厂商。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolDescriptor;

/// 模型端点错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request error: {0}")]
    Request(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("config error: {0}")]
    Config(String),
}

/// 增量响应片段；片段与内容项不是一一对应，工具调用参数可能分多片到达
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFragment {
    Text(String),
    /// 按 index 关联同一调用的多个片段；id / name 通常只在首片出现
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    Finish(String),
}

impl ResponseFragment {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// 单片完整的工具调用（测试与 Mock 使用）
    pub fn tool_call(index: usize, id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::ToolCallDelta {
            index,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: Some(arguments.to_string()),
        }
    }

    /// 仅追加参数片段
    pub fn arguments(index: usize, fragment: &str) -> Self {
        Self::ToolCallDelta {
            index,
            id: None,
            name: None,
            arguments: Some(fragment.to_string()),
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<ResponseFragment, LlmError>> + Send>>;

/// LLM 客户端 trait：发送完整日志与工具列表，返回流式片段
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<FragmentStream, LlmError>;
}
