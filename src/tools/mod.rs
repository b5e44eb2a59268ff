//! 工具箱：沙箱文件系统、进程调度、包管理、文档查询，以及注册表与执行器

pub mod docs;
pub mod executor;
pub mod filesystem;
pub mod package;
pub mod process;
pub mod registry;
pub mod schema;

use std::sync::Arc;

pub use docs::PackageDocsTool;
pub use executor::ToolExecutor;
pub use filesystem::{
    GetBaseDirectoryTool, ListDirectoryTool, PatchFileLinesTool, ReadFileTool, WorkspaceSandbox,
    WriteFileTool, END_OF_FILE,
};
pub use package::{GoInstallTool, GoModTidyTool};
pub use process::{ProcessDispatcher, ProcessResult};
pub use registry::{Tool, ToolDescriptor, ToolRegistry};

use crate::config::ToolsSection;
use crate::core::ToolError;

/// 构建固定工具集（注册顺序即描述符顺序）
pub fn default_registry(
    sandbox: Arc<WorkspaceSandbox>,
    tools: &ToolsSection,
) -> Result<ToolRegistry, ToolError> {
    let dispatcher = ProcessDispatcher::new(Some(tools.tool_timeout_secs));
    let program = tools.package_manager.program.clone();

    let mut registry = ToolRegistry::new();
    registry.register(GetBaseDirectoryTool::new(sandbox.clone()))?;
    registry.register(ListDirectoryTool::new(sandbox.clone()))?;
    registry.register(ReadFileTool::new(sandbox.clone()))?;
    registry.register(WriteFileTool::new(sandbox.clone()))?;
    registry.register(PatchFileLinesTool::new(sandbox.clone()))?;
    registry.register(GoInstallTool::new(
        sandbox.clone(),
        dispatcher.clone(),
        program.clone(),
    ))?;
    registry.register(GoModTidyTool::new(sandbox, dispatcher, program))?;
    registry.register(PackageDocsTool::new(
        tools.docs.url_template.clone(),
        tools.docs.content_class.clone(),
        tools.docs.timeout_secs,
        tools.docs.max_result_chars,
    ))?;
    Ok(registry)
}
