//! 对话编排主循环
//!
//! 一条用户消息 = 一次 submit：把完整日志与工具描述符发给模型，消费流式响应（文本即时推送，工具调用按 index 拼装），
//! 若本轮有工具调用则分道执行，把 assistant 轮与全部结果一次性原子追加，再带着结果重新询问模型；
//! 直到某轮没有工具调用为止。模型流式调用是每轮唯一的挂起点，日志只由编排器追加。
//!
//! 限制：max_tool_rounds 轮数上限、request / stream 超时、CancellationToken 取消（子进程随 future 丢弃被终止）。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, TurnState};
use crate::llm::{FragmentStream, LlmClient, ResponseFragment};
use crate::memory::{ConversationLog, Message, ToolCallRequest};
use crate::react::{fresh_call_id, ReactEvent, ToolCallAccumulator};
use crate::tools::ToolExecutor;

/// 单条用户消息内的上限与超时
#[derive(Debug, Clone)]
pub struct TurnLimits {
    pub max_tool_rounds: usize,
    /// 等待模型开始响应
    pub request_timeout: Duration,
    /// 相邻流片段的最大间隔
    pub stream_timeout: Duration,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_tool_rounds: 25,
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ConversationOrchestrator {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    log: ConversationLog,
    limits: TurnLimits,
    state: TurnState,
}

fn emit(events: Option<&UnboundedSender<ReactEvent>>, event: ReactEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

impl ConversationOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        system_prompt: Option<String>,
        limits: TurnLimits,
    ) -> Self {
        let log = match system_prompt {
            Some(prompt) => ConversationLog::with_system(prompt),
            None => ConversationLog::new(),
        };
        Self {
            llm,
            executor,
            log,
            limits,
            state: TurnState::AwaitingUserInput,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 处理一条用户消息，返回本条消息最后一轮（无工具调用）的模型文本
    ///
    /// 失败时状态回到 AwaitingUserInput；已追加的日志保持一致（未完成的工具轮不会写入）。
    pub async fn submit(
        &mut self,
        user_input: &str,
        events: Option<&UnboundedSender<ReactEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let result = self.run(user_input, events, cancel).await;
        self.transition(TurnState::AwaitingUserInput, events);
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "turn aborted");
        }
        result
    }

    async fn run(
        &mut self,
        user_input: &str,
        events: Option<&UnboundedSender<ReactEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        self.log.push(Message::user(user_input))?;
        let mut rounds = 0usize;

        loop {
            self.transition(TurnState::StreamingModelResponse, events);
            let (text, mut calls) = self.stream_turn(events, cancel).await?;
            self.rename_reused_ids(&mut calls);

            if calls.is_empty() {
                self.log.push(Message::assistant(text.clone()))?;
                emit(events, ReactEvent::TurnComplete { rounds });
                return Ok(text);
            }

            if rounds >= self.limits.max_tool_rounds {
                return Err(AgentError::MaxRoundsExceeded(self.limits.max_tool_rounds));
            }
            rounds += 1;

            self.transition(TurnState::ExecutingTools, events);
            for call in &calls {
                emit(
                    events,
                    ReactEvent::ToolCall {
                        call_id: call.call_id.clone(),
                        name: call.tool_name.clone(),
                        arguments: call.arguments.clone(),
                    },
                );
            }

            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                results = self.executor.execute_batch(&calls) => results,
            };
            for result in &results {
                emit(
                    events,
                    ReactEvent::ToolResult {
                        call_id: result.call_id.clone(),
                        rendered: result.render(),
                        is_error: result.is_error(),
                    },
                );
            }

            let mut batch = Vec::with_capacity(results.len() + 1);
            batch.push(Message::assistant_turn(text, calls));
            batch.extend(results.into_iter().map(Message::tool_result));
            self.log.append_all(batch)?;
        }
    }

    /// 一次模型调用：收集文本并拼装工具调用
    async fn stream_turn(
        &self,
        events: Option<&UnboundedSender<ReactEvent>>,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<ToolCallRequest>), AgentError> {
        let tools = self.executor.descriptors();
        let request = timeout(
            self.limits.request_timeout,
            self.llm.stream_chat(self.log.messages(), &tools),
        );
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            opened = request => opened,
        };
        let mut stream: FragmentStream = opened
            .map_err(|_| AgentError::TurnTimeout(self.limits.request_timeout.as_secs()))??;

        let mut text = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                next = timeout(self.limits.stream_timeout, stream.next()) => next,
            };
            let fragment = match next {
                Err(_) => {
                    return Err(AgentError::TurnTimeout(
                        self.limits.stream_timeout.as_secs(),
                    ))
                }
                Ok(None) => break,
                Ok(Some(fragment)) => fragment?,
            };
            match fragment {
                ResponseFragment::Text(chunk) => {
                    emit(events, ReactEvent::TextChunk { text: chunk.clone() });
                    text.push_str(&chunk);
                }
                ResponseFragment::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                } => accumulator.merge(index, id, name, arguments),
                ResponseFragment::Finish(reason) => {
                    tracing::debug!(reason = %reason, "model turn finished");
                }
            }
        }

        let calls = accumulator.build()?;
        tracing::debug!(chars = text.len(), tool_calls = calls.len(), "model turn assembled");
        Ok((text, calls))
    }

    /// 执行前去重：与日志中已请求的 id 或本轮前面的 id 重复时换成新 id，保证每个结果只对应一个调用
    fn rename_reused_ids(&self, calls: &mut [ToolCallRequest]) {
        let mut seen = HashSet::new();
        for call in calls.iter_mut() {
            if self.log.is_requested(&call.call_id) || !seen.insert(call.call_id.clone()) {
                let renamed = fresh_call_id();
                tracing::warn!(
                    call_id = %call.call_id,
                    renamed = %renamed,
                    tool = %call.tool_name,
                    "duplicate tool call id from model"
                );
                call.call_id = renamed;
                seen.insert(call.call_id.clone());
            }
        }
    }

    fn transition(&mut self, next: TurnState, events: Option<&UnboundedSender<ReactEvent>>) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "turn state");
            self.state = next;
            emit(events, ReactEvent::StateChange { state: next });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolError;
    use crate::llm::MockLlmClient;
    use crate::memory::{ContentItem, Role};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "uppercases text"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            let text = args["text"].as_str().unwrap_or_default();
            Ok(Value::String(text.to_uppercase()))
        }
    }

    fn orchestrator(llm: Arc<MockLlmClient>, max_rounds: usize) -> ConversationOrchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(Upper).unwrap();
        ConversationOrchestrator::new(
            llm,
            ToolExecutor::new(registry, 5),
            Some("you migrate things".into()),
            TurnLimits {
                max_tool_rounds: max_rounds,
                ..TurnLimits::default()
            },
        )
    }

    #[tokio::test]
    async fn test_turn_without_tool_calls_returns_immediately() {
        let llm = Arc::new(MockLlmClient::with_script(vec![vec![
            ResponseFragment::text("Nothing "),
            ResponseFragment::text("to do."),
        ]]));
        let mut orch = orchestrator(llm.clone(), 5);
        let reply = orch
            .submit("hi", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply, "Nothing to do.");
        assert_eq!(llm.requests().len(), 1);
        assert_eq!(llm.requests()[0].tool_names, vec!["upper"]);
        assert_eq!(orch.log().len(), 3);
        assert_eq!(orch.state(), TurnState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn test_tool_results_correlated_and_model_requeried() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::text("Checking."),
                ResponseFragment::tool_call(0, "call_1", "upper", json!({"text": "a"})),
                ResponseFragment::tool_call(1, "call_2", "upper", json!({"wrong": 1})),
            ],
            vec![ResponseFragment::text("Done.")],
        ]));
        let mut orch = orchestrator(llm.clone(), 5);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reply = orch
            .submit("go", Some(&tx), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "Done.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        // system, user, assistant(calls), tool, tool
        assert_eq!(second.len(), 5);
        assert_eq!(second[2].tool_calls().count(), 2);
        let results: Vec<_> = second.iter().flat_map(|m| m.tool_results()).collect();
        assert_eq!(results[0].call_id, "call_1");
        assert_eq!(results[0].result, Some(json!("A")));
        assert_eq!(results[1].call_id, "call_2");
        assert!(results[1].error.as_deref().unwrap().contains("Invalid arguments"));
        assert!(orch.log().pending_call_ids().is_empty());

        drop(tx);
        let mut saw_call = false;
        let mut saw_complete = false;
        while let Some(event) = rx.recv().await {
            match event {
                ReactEvent::ToolCall { call_id, .. } if call_id == "call_1" => saw_call = true,
                ReactEvent::TurnComplete { rounds } => {
                    assert_eq!(rounds, 1);
                    saw_complete = true;
                }
                _ => {}
            }
        }
        assert!(saw_call && saw_complete);
    }

    #[tokio::test]
    async fn test_incremental_arguments_dispatched_once_complete() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::ToolCallDelta {
                    index: 0,
                    id: Some("c".into()),
                    name: Some("upper".into()),
                    arguments: Some("{\"te".into()),
                },
                ResponseFragment::arguments(0, "xt\":\"mig"),
                ResponseFragment::arguments(0, "rate\"}"),
                ResponseFragment::Finish("tool_calls".into()),
            ],
            vec![ResponseFragment::text("ok")],
        ]));
        let mut orch = orchestrator(llm, 5);
        orch.submit("x", None, &CancellationToken::new())
            .await
            .unwrap();

        let result = orch
            .log()
            .messages()
            .iter()
            .flat_map(|m| m.tool_results())
            .next()
            .cloned()
            .unwrap();
        assert_eq!(result.result, Some(json!("MIGRATE")));
    }

    #[tokio::test]
    async fn test_duplicate_call_ids_get_distinct_results() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            vec![
                ResponseFragment::tool_call(0, "call_0", "upper", json!({"text": "a"})),
                ResponseFragment::tool_call(1, "call_0", "upper", json!({"text": "b"})),
            ],
            vec![ResponseFragment::text("ok")],
        ]));
        let mut orch = orchestrator(llm.clone(), 5);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        orch.submit("dup", Some(&tx), &CancellationToken::new())
            .await
            .unwrap();

        let results: Vec<_> = orch
            .log()
            .messages()
            .iter()
            .flat_map(|m| m.tool_results())
            .cloned()
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "call_0");
        assert_eq!(results[0].result, Some(json!("A")));
        assert_ne!(results[1].call_id, "call_0");
        assert!(results[1].call_id.starts_with("call_"));
        assert_eq!(results[1].result, Some(json!("B")));
        assert!(orch.log().pending_call_ids().is_empty());

        drop(tx);
        let mut announced = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ReactEvent::ToolCall { call_id, .. } = event {
                announced.push(call_id);
            }
        }
        assert_eq!(announced, vec![results[0].call_id.clone(), results[1].call_id.clone()]);
    }

    #[tokio::test]
    async fn test_max_rounds_exceeded() {
        let looping = |id: &str| vec![ResponseFragment::tool_call(0, id, "upper", json!({"text": "x"}))];
        let llm = Arc::new(MockLlmClient::with_script(vec![
            looping("a"),
            looping("b"),
            looping("c"),
        ]));
        let mut orch = orchestrator(llm, 2);
        let err = orch
            .submit("loop", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MaxRoundsExceeded(2)));
        assert_eq!(orch.state(), TurnState::AwaitingUserInput);
        assert!(orch.log().pending_call_ids().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_stream_is_fatal() {
        let llm = Arc::new(MockLlmClient::with_script(vec![vec![ResponseFragment::arguments(
            0, "{}",
        )]]));
        let mut orch = orchestrator(llm, 5);
        let err = orch
            .submit("x", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedStream(_)));
        let last = orch.log().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(matches!(last.content[0], ContentItem::Text(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_turn() {
        let llm = Arc::new(MockLlmClient::with_script(vec![vec![ResponseFragment::text("late")]]));
        let mut orch = orchestrator(llm, 5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orch.submit("x", None, &cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
