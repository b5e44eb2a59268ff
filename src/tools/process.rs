//! 进程调度：在指定目录同步运行外部命令
//!
//! 完整收集 stdout / stderr 并等待退出；退出码 0 返回 stdout，非 0 返回 ProcessFailed（含退出码与 stderr）。
//! 子进程以 kill_on_drop 启动：超时或上层取消（future 被丢弃）时子进程随之终止。

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::core::ToolError;

/// 单次进程执行的捕获结果（仅在一次工具调用内存在）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    /// 被信号终止时为 -1
    pub exit_code: i32,
}

/// 进程调度器：可选的单次执行超时
#[derive(Debug, Clone, Default)]
pub struct ProcessDispatcher {
    timeout: Option<Duration>,
}

impl ProcessDispatcher {
    pub fn new(timeout_secs: Option<u64>) -> Self {
        Self {
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    /// 运行并返回完整捕获结果（不解释退出码）
    pub async fn run_captured(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<ProcessResult, ToolError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        tracing::info!(
            program = %program,
            args = ?args,
            cwd = %working_dir.display(),
            "process dispatch"
        );

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ToolError::TimedOut(limit.as_secs()))?,
            None => cmd.output().await,
        }
        .map_err(|e| ToolError::SpawnFailed {
            program: program.to_string(),
            message: e.to_string(),
        })?;

        Ok(ProcessResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// 运行命令：退出码 0 返回 stdout，否则 ProcessFailed
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<String, ToolError> {
        let result = self.run_captured(program, args, working_dir).await?;
        if result.exit_code != 0 {
            tracing::warn!(program = %program, exit_code = result.exit_code, "process failed");
            return Err(ToolError::ProcessFailed {
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout)
    }
}
