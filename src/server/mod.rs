//! 进程外工具服务：通过 MCP（stdio）暴露与编排器相同的一套工具
//!
//! tools/list 直接来自注册表的描述符；tools/call 交给 ToolExecutor（同样的 schema 校验、超时与审计日志）。
//! 工具失败作为 isError 结果返回，而不是协议错误，调用方总能拿到可读的错误文本。

use std::sync::Arc;

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError, ServerHandler,
};
use serde_json::Value;

use crate::memory::ToolCallRequest;
use crate::tools::{ToolDescriptor, ToolExecutor};

/// MCP 服务端：持有共享的工具执行器
#[derive(Clone)]
pub struct MigratorToolServer {
    executor: Arc<ToolExecutor>,
}

impl std::fmt::Debug for MigratorToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigratorToolServer")
            .field("tools", &self.executor.tool_names())
            .finish()
    }
}

impl MigratorToolServer {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// 按注册顺序返回 MCP 工具定义
    pub fn tools(&self) -> Vec<Tool> {
        self.executor.descriptors().into_iter().map(to_mcp_tool).collect()
    }

    /// 执行一次调用；未知工具、参数错误与处理函数错误都变成 isError 结果
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> CallToolResult {
        let request = ToolCallRequest {
            call_id: format!("mcp_{}", uuid::Uuid::new_v4().simple()),
            tool_name: name.to_string(),
            arguments: arguments.map(Value::Object).unwrap_or(Value::Null),
        };
        let result = self.executor.execute(&request).await;
        let content = vec![Content::text(result.render())];
        if result.is_error() {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}

fn to_mcp_tool(descriptor: ToolDescriptor) -> Tool {
    let input_schema = match descriptor.parameters {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };
    Tool {
        name: descriptor.name.into(),
        title: None,
        description: Some(descriptor.description.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

impl ServerHandler for MigratorToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "migrator-tools".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Tools for migrating a Go workspace between dependencies. \
                 Every path argument must be an absolute path under the base directory \
                 returned by get_base_directory."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = %request.name, "mcp tools/call");
        Ok(self.invoke(request.name.as_ref(), request.arguments).await)
    }
}
