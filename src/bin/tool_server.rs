//! Migrator Tools - stdio MCP 工具服务
//!
//! 把沙箱文件系统、Go 包管理与文档查询工具暴露给进程外的模型宿主。
//!
//! 运行方式：
//! ```bash
//! cargo run --bin migrator-tools -- --root ./example
//! ```
//! stdout 只输出 MCP 报文，日志写到 stderr。

use anyhow::Context;
use clap::Parser;
use rmcp::ServiceExt;

use migrator::config::{load_config, CliArgs};
use migrator::core::AgentBuilder;
use migrator::server::MigratorToolServer;
use migrator::tools::ToolExecutor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    migrator::observability::init();

    let args = CliArgs::parse();
    let mut cfg = load_config(args.config.clone()).context("Failed to load config")?;
    args.apply(&mut cfg);

    let builder = AgentBuilder::new(cfg);
    let sandbox = builder.build_sandbox().context("Failed to open workspace")?;
    let registry = builder
        .build_tool_registry(sandbox.clone())
        .context("Failed to register tools")?;
    let executor = ToolExecutor::new(registry, builder.config().tools.tool_timeout_secs);

    tracing::info!(
        root = %sandbox.root().display(),
        tools = executor.tool_names().len(),
        "tool server listening on stdio"
    );

    let service = MigratorToolServer::new(executor)
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "failed to start MCP service"))?;
    service.waiting().await?;

    tracing::info!("stdin closed, tool server exiting");
    Ok(())
}
