//! 包管理器工具：go get / go mod tidy
//!
//! 目录参数经沙箱校验（InvalidPath / NotFound），包名不能为空；通过 ProcessDispatcher 调用配置中的程序（默认 go）。
//! 资源键是整个模块目录：同一轮里对 go.mod / go.sum 等目录内文件的读写都排在它前后串行执行。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::filesystem::{path_key, WorkspaceSandbox};
use crate::tools::process::ProcessDispatcher;
use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::Tool;

#[derive(Deserialize, JsonSchema)]
struct InstallArgs {
    /// Absolute path of the module directory (containing go.mod)
    directory: String,
    /// Package import path, e.g. github.com/google/uuid
    package_name: String,
    /// Optional version such as 1.6.0; latest when omitted
    package_version: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct TidyArgs {
    /// Absolute path of the module directory (containing go.mod)
    directory: String,
}

/// 校验目录：在沙箱内且存在
fn module_dir(sandbox: &WorkspaceSandbox, directory: &str) -> Result<PathBuf, ToolError> {
    let dir = sandbox.resolve(directory)?;
    if !dir.is_dir() {
        return Err(ToolError::NotFound(format!(
            "directory '{}' does not exist",
            directory
        )));
    }
    Ok(dir)
}

/// 组装 `get <pkg>[@v<version>]`；latest 原样传递，已带 v 前缀的版本不重复添加
fn install_args(package_name: &str, package_version: Option<&str>) -> Vec<String> {
    let spec = match package_version.map(str::trim).filter(|v| !v.is_empty()) {
        None => package_name.to_string(),
        Some("latest") => format!("{}@latest", package_name),
        Some(v) => format!("{}@v{}", package_name, v.trim_start_matches('v')),
    };
    vec!["get".to_string(), spec]
}

/// 安装 Go 包
pub struct GoInstallTool {
    sandbox: Arc<WorkspaceSandbox>,
    dispatcher: ProcessDispatcher,
    program: String,
}

impl GoInstallTool {
    pub fn new(
        sandbox: Arc<WorkspaceSandbox>,
        dispatcher: ProcessDispatcher,
        program: impl Into<String>,
    ) -> Self {
        Self {
            sandbox,
            dispatcher,
            program: program.into(),
        }
    }
}

#[async_trait]
impl Tool for GoInstallTool {
    fn name(&self) -> &str {
        "go_install"
    }

    fn description(&self) -> &str {
        "Install a Go package in the specified module directory. \
         If the package version is not specified, the latest version is installed."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<InstallArgs>()
    }

    fn resource_key(&self, args: &Value) -> Option<PathBuf> {
        path_key(&self.sandbox, args, "directory")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: InstallArgs = parse_args(args)?;
        let dir = module_dir(&self.sandbox, &args.directory)?;
        if args.package_name.trim().is_empty() {
            return Err(ToolError::ArgumentError(
                "package_name cannot be empty".to_string(),
            ));
        }
        let argv = install_args(args.package_name.trim(), args.package_version.as_deref());
        let stdout = self.dispatcher.run(&self.program, &argv, &dir).await?;
        Ok(Value::String(stdout))
    }
}

/// 整理依赖（go mod tidy）
pub struct GoModTidyTool {
    sandbox: Arc<WorkspaceSandbox>,
    dispatcher: ProcessDispatcher,
    program: String,
}

impl GoModTidyTool {
    pub fn new(
        sandbox: Arc<WorkspaceSandbox>,
        dispatcher: ProcessDispatcher,
        program: impl Into<String>,
    ) -> Self {
        Self {
            sandbox,
            dispatcher,
            program: program.into(),
        }
    }
}

#[async_trait]
impl Tool for GoModTidyTool {
    fn name(&self) -> &str {
        "go_mod_tidy"
    }

    fn description(&self) -> &str {
        "Run 'go mod tidy' in the specified module directory."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<TidyArgs>()
    }

    fn resource_key(&self, args: &Value) -> Option<PathBuf> {
        path_key(&self.sandbox, args, "directory")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: TidyArgs = parse_args(args)?;
        let dir = module_dir(&self.sandbox, &args.directory)?;
        let argv = vec!["mod".to_string(), "tidy".to_string()];
        let stdout = self.dispatcher.run(&self.program, &argv, &dir).await?;
        Ok(Value::String(stdout))
    }
}
