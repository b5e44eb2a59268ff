//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，含 Azure 代理）；请求与流响应使用自定义
//! serde 结构（byot），把对话日志映射为 chat/completions 消息，把每个流块拆成 ResponseFragment。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::llm::{FragmentStream, LlmClient, LlmError, ResponseFragment};
use crate::memory::{ContentItem, Message, Role};
use crate::tools::ToolDescriptor;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallChunk>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallChunk {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionChunk {
    name: Option<String>,
    arguments: Option<String>,
}

/// 对话日志 → chat/completions 消息；每个工具结果单独成为一条 role=tool 消息
fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::System | Role::User => out.push(WireMessage {
                role: if m.role == Role::System { "system" } else { "user" },
                content: Some(m.text()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }),
            Role::Assistant => {
                let text = m.text();
                let tool_calls: Vec<WireToolCall> = m
                    .tool_calls()
                    .map(|c| WireToolCall {
                        id: c.call_id.clone(),
                        kind: "function",
                        function: WireFunctionCall {
                            name: c.tool_name.clone(),
                            arguments: match &c.arguments {
                                Value::String(raw) => raw.clone(),
                                other => other.to_string(),
                            },
                        },
                    })
                    .collect();
                out.push(WireMessage {
                    role: "assistant",
                    content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
                    tool_calls,
                    tool_call_id: None,
                });
            }
            Role::Tool => {
                for item in &m.content {
                    if let ContentItem::ToolCallResult(r) = item {
                        out.push(WireMessage {
                            role: "tool",
                            content: Some(r.render()),
                            tool_calls: Vec::new(),
                            tool_call_id: Some(r.call_id.clone()),
                        });
                    }
                }
            }
        }
    }
    out
}

fn to_wire_tools(tools: &[ToolDescriptor]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

/// 单个流块 → 片段列表（空片段丢弃）
fn chunk_to_fragments(chunk: ChatStreamChunk) -> Vec<ResponseFragment> {
    let mut items = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            items.push(ResponseFragment::Text(text));
        }
        for call in choice.delta.tool_calls.unwrap_or_default() {
            let function = call.function.unwrap_or_default();
            if call.id.is_none() && function.name.is_none() && function.arguments.is_none() {
                continue;
            }
            items.push(ResponseFragment::ToolCallDelta {
                index: call.index,
                id: call.id,
                name: function.name,
                arguments: function.arguments,
            });
        }
        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
            items.push(ResponseFragment::Finish(reason));
        }
    }
    items
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<FragmentStream, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: to_wire_messages(messages),
            tools: to_wire_tools(tools),
            stream: true,
        };
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat stream request"
        );

        let chunks: Pin<Box<dyn Stream<Item = Result<ChatStreamChunk, OpenAIError>> + Send>> = self
            .client
            .chat()
            .create_stream_byot(request)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let fragments = chunks.flat_map(|item| {
            let batch: Vec<Result<ResponseFragment, LlmError>> = match item {
                Ok(chunk) => chunk_to_fragments(chunk).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(LlmError::Stream(e.to_string()))],
            };
            stream::iter(batch)
        });
        Ok(Box::pin(fragments))
    }
}
