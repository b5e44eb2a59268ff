//! 错误类型
//!
//! - ToolError：工具层失败，由 ToolRegistry / ToolExecutor 转为 ToolCallResult.error，永不中断对话
//! - AgentError：编排器自身的管线失败（流片段畸形、日志不变量被破坏、超时、轮数上限），对本轮致命

use thiserror::Error;

use crate::llm::LlmError;

/// 工具调用失败（沙箱、进程、注册表、文档抓取）
#[derive(Error, Debug)]
pub enum ToolError {
    /// 路径不在沙箱根目录下（或不是绝对路径）
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid line range: {0}")]
    InvalidRange(String),

    #[error("Process failed with exit code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("Failed to launch '{program}': {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    ArgumentError(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Timed out after {0}s")]
    TimedOut(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 编排器运行错误：出现即终止当前轮次，交还给调用方
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed model stream: {0}")]
    MalformedStream(String),

    #[error("Conversation log violation: {0}")]
    LogViolation(String),

    #[error("Tool-call round limit reached ({0})")]
    MaxRoundsExceeded(usize),

    #[error("Model turn timed out after {0}s")]
    TurnTimeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}
