//! 流式工具调用拼装
//!
//! 模型的工具调用以增量片段到达：同一调用的片段按 index 关联，id / name 一般只出现在首片，
//! arguments 被拆成若干 JSON 字符串碎片。流结束后 build 产出完整的 ToolCallRequest 列表（按 index 排序）。

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::AgentError;
use crate::memory::ToolCallRequest;

/// 生成 `call_<uuid>` 形式的调用 id
pub fn fresh_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    by_index: BTreeMap<usize, PendingCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn merge(
        &mut self,
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) {
        let entry = self.by_index.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            entry.id = Some(id);
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            entry.name = Some(name);
        }
        if let Some(fragment) = arguments {
            entry.arguments.push_str(&fragment);
        }
    }

    /// 缺 name 视为流损坏；缺 id 时生成；参数无法解析时保留原始字符串，由注册表报参数错误
    pub fn build(self) -> Result<Vec<ToolCallRequest>, AgentError> {
        self.by_index
            .into_iter()
            .map(|(index, call)| {
                let tool_name = call.name.ok_or_else(|| {
                    AgentError::MalformedStream(format!("tool call #{} has no name", index))
                })?;
                let call_id = call.id.unwrap_or_else(fresh_call_id);
                let raw = call.arguments.trim();
                let arguments = if raw.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(raw).unwrap_or_else(|e| {
                        tracing::warn!(call_id = %call_id, error = %e, "unparsable tool arguments");
                        Value::String(raw.to_string())
                    })
                };
                Ok(ToolCallRequest {
                    call_id,
                    tool_name,
                    arguments,
                })
            })
            .collect()
    }
}
