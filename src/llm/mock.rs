//! Mock LLM 客户端（用于测试与离线试跑，无需 API）
//!
//! 默认模式：回显最后一条 User 消息为文本，不发起工具调用。
//! 脚本模式：每次请求按顺序弹出一组预设片段，并记录收到的消息日志与工具名，便于断言多轮交互。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{FragmentStream, LlmClient, LlmError, ResponseFragment};
use crate::memory::{Message, Role};
use crate::tools::ToolDescriptor;

/// 一次 stream_chat 调用收到的输入快照
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Option<Mutex<VecDeque<Vec<ResponseFragment>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个元素对应一次模型响应
    pub fn with_script(responses: Vec<Vec<ResponseFragment>>) -> Self {
        Self {
            script: Some(Mutex::new(responses.into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_response(&self, messages: &[Message]) -> Result<Vec<ResponseFragment>, LlmError> {
        match &self.script {
            Some(script) => script
                .lock()
                .map_err(|_| LlmError::Request("mock script poisoned".to_string()))?
                .pop_front()
                .ok_or_else(|| LlmError::Request("mock script exhausted".to_string())),
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.text())
                    .unwrap_or_else(|| "(no input)".to_string());
                Ok(vec![
                    ResponseFragment::text("Echo from Mock: "),
                    ResponseFragment::text(last_user),
                    ResponseFragment::Finish("stop".to_string()),
                ])
            }
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<FragmentStream, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        let fragments = self.next_response(messages)?;
        Ok(Box::pin(stream::iter(fragments.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_echo_mode() {
        let client = MockLlmClient::new();
        let stream = client
            .stream_chat(&[Message::user("hello")], &[])
            .await
            .unwrap();
        let text: String = stream
            .filter_map(|f| async move {
                match f {
                    Ok(ResponseFragment::Text(t)) => Some(t),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert_eq!(text, "Echo from Mock: hello");
    }

    #[tokio::test]
    async fn test_script_mode_records_and_exhausts() {
        let client = MockLlmClient::with_script(vec![vec![ResponseFragment::text("one")]]);
        assert!(client.stream_chat(&[Message::user("a")], &[]).await.is_ok());
        assert!(matches!(
            client.stream_chat(&[Message::user("b")], &[]).await,
            Err(LlmError::Request(_))
        ));
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages[0].text(), "b");
    }
}
