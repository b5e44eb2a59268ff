//! Migrator - LLM 驱动的依赖迁移智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、编排状态机、Agent 构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容流式 / Mock）
//! - **memory**: 只追加的对话日志（消息、工具调用请求与结果）
//! - **react**: 对话编排主循环、流式工具调用拼装、过程事件
//! - **server**: stdio MCP 工具服务（rmcp）
//! - **tools**: 沙箱文件系统、进程调度、包管理、文档查询、注册表与执行器

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod server;
pub mod tools;

pub use crate::config::{load_config, AppConfig};
pub use crate::core::{AgentBuilder, AgentError, ToolError};
pub use crate::react::ConversationOrchestrator;
