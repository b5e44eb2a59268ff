//! 对话日志：有序、只追加的消息序列
//!
//! 日志是呈现给模型的唯一上下文来源。追加时校验不变量：
//! - system 消息只能出现在所有其他消息之前
//! - 每个 ToolCallResult.call_id 必须对应此前出现过的 ToolCallRequest，且每个 id 至多一个结果

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 工具调用请求：模型在流式输出中嵌入的结构化调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    /// 参数映射；流中参数无法解析为 JSON 时保留原始字符串，由注册表报告 ArgumentError
    pub arguments: Value,
}

/// 工具调用结果：result 与 error 互斥
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn ok(call_id: impl Into<String>, value: Value) -> Self {
        Self {
            call_id: call_id.into(),
            result: Some(value),
            error: None,
        }
    }

    pub fn err(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 发给模型 / 打印日志用的纯文本形式
    pub fn render(&self) -> String {
        match (&self.result, &self.error) {
            (_, Some(e)) => format!("Error: {}", e),
            (Some(Value::String(s)), None) => s.clone(),
            (Some(Value::Null), None) | (None, None) => "OK".to_string(),
            (Some(v), None) => v.to_string(),
        }
    }
}

/// 消息内容项
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentItem {
    Text(String),
    ToolCallRequest(ToolCallRequest),
    ToolCallResult(ToolCallResult),
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentItem>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentItem::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentItem::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentItem::Text(text.into())],
        }
    }

    /// 一轮流式输出：文本（可为空）+ 组装完成的工具调用请求
    pub fn assistant_turn(text: String, calls: Vec<ToolCallRequest>) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentItem::Text(text));
        }
        content.extend(calls.into_iter().map(ContentItem::ToolCallRequest));
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_result(result: ToolCallResult) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentItem::ToolCallResult(result)],
        }
    }

    /// 拼接所有文本项
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentItem::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.content.iter().filter_map(|c| match c {
            ContentItem::ToolCallRequest(r) => Some(r),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolCallResult> {
        self.content.iter().filter_map(|c| match c {
            ContentItem::ToolCallResult(r) => Some(r),
            _ => None,
        })
    }
}

/// 只追加的对话日志
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    requested: HashSet<String>,
    answered: HashSet<String>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut log = Self::new();
        log.messages.push(Message::system(prompt));
        log
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 该 id 是否已被日志中某个 assistant 轮请求过
    pub fn is_requested(&self, call_id: &str) -> bool {
        self.requested.contains(call_id)
    }

    /// 已请求但尚无结果的调用 id
    pub fn pending_call_ids(&self) -> Vec<String> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .filter(|r| !self.answered.contains(&r.call_id))
            .map(|r| r.call_id.clone())
            .collect()
    }

    pub fn push(&mut self, message: Message) -> Result<(), AgentError> {
        self.append_all(vec![message])
    }

    /// 原子追加：全部校验通过才写入，任一违反不变量则日志保持不变
    pub fn append_all(&mut self, batch: Vec<Message>) -> Result<(), AgentError> {
        let mut requested = self.requested.clone();
        let mut answered = self.answered.clone();
        let mut only_system = self.messages.iter().all(|m| m.role == Role::System);

        for message in &batch {
            if message.role == Role::System {
                if !only_system {
                    return Err(AgentError::LogViolation(
                        "system message after conversation start".to_string(),
                    ));
                }
            } else {
                only_system = false;
            }

            for item in &message.content {
                match item {
                    ContentItem::Text(_) => {}
                    ContentItem::ToolCallRequest(req) => {
                        if message.role != Role::Assistant {
                            return Err(AgentError::LogViolation(format!(
                                "tool call {} outside an assistant message",
                                req.call_id
                            )));
                        }
                        if !requested.insert(req.call_id.clone()) {
                            return Err(AgentError::LogViolation(format!(
                                "duplicate tool call id {}",
                                req.call_id
                            )));
                        }
                    }
                    ContentItem::ToolCallResult(res) => {
                        if message.role != Role::Tool {
                            return Err(AgentError::LogViolation(format!(
                                "tool result {} outside a tool message",
                                res.call_id
                            )));
                        }
                        if !requested.contains(&res.call_id) {
                            return Err(AgentError::LogViolation(format!(
                                "result for unknown call id {}",
                                res.call_id
                            )));
                        }
                        if !answered.insert(res.call_id.clone()) {
                            return Err(AgentError::LogViolation(format!(
                                "second result for call id {}",
                                res.call_id
                            )));
                        }
                    }
                }
            }
        }

        self.requested = requested;
        self.answered = answered;
        self.messages.extend(batch);
        Ok(())
    }
}

/// 将参数对象转为日志友好的字符串（`{...}`）
pub fn arguments_display(arguments: &Value) -> String {
    match arguments {
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(_) => arguments.to_string(),
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
