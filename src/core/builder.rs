//! Agent 构建器：从 AppConfig 组装沙箱、工具注册表、LLM 客户端与编排器
//!
//! CLI 与集成测试共用同一套组装逻辑；测试可通过 with_llm 注入 Mock 客户端。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::react::{ConversationOrchestrator, TurnLimits};
use crate::tools::{default_registry, ToolExecutor, ToolRegistry, WorkspaceSandbox};

/// 内置系统提示词（可被 app.system_prompt 覆盖）
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert programmer and dependency manager.
You help people migrate their codebases from one dependency to another.
All file and package operations go through the provided tools; call get_base_directory first \
and always pass absolute paths under that directory.
Before changing code, read the package documentation of the new dependency and the affected files.
If there is any ambiguity in the request, ask for clarification.
If the migration is not possible, say so and explain why.
When you are done, write a migration_summary.md in the base directory describing every change you made.";

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config, llm: None }
    }

    /// 覆盖按配置创建的 LLM 客户端
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_sandbox(&self) -> Result<Arc<WorkspaceSandbox>, AgentError> {
        let root = self.config.workspace_root();
        WorkspaceSandbox::new(&root)
            .map(Arc::new)
            .map_err(|e| AgentError::Config(format!("workspace root {}: {}", root.display(), e)))
    }

    pub fn build_tool_registry(
        &self,
        sandbox: Arc<WorkspaceSandbox>,
    ) -> Result<ToolRegistry, AgentError> {
        default_registry(sandbox, &self.config.tools).map_err(|e| AgentError::Config(e.to_string()))
    }

    /// provider = mock 时使用回显客户端；否则从 api_key_env 读取密钥
    pub fn build_llm(&self) -> Result<Arc<dyn LlmClient>, AgentError> {
        if let Some(llm) = &self.llm {
            return Ok(llm.clone());
        }
        let llm = &self.config.llm;
        match llm.provider.as_str() {
            "mock" => Ok(Arc::new(MockLlmClient::new())),
            "openai" => {
                let api_key = std::env::var(&llm.api_key_env).map_err(|_| {
                    AgentError::Config(format!(
                        "environment variable {} is not set",
                        llm.api_key_env
                    ))
                })?;
                Ok(Arc::new(OpenAiClient::new(
                    llm.base_url.as_deref(),
                    &llm.model,
                    &api_key,
                )))
            }
            other => Err(AgentError::Config(format!("unknown llm provider: {}", other))),
        }
    }

    pub fn system_prompt(&self) -> String {
        self.config
            .app
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub fn limits(&self) -> TurnLimits {
        TurnLimits {
            max_tool_rounds: self.config.app.max_tool_rounds,
            request_timeout: Duration::from_secs(self.config.llm.timeouts.request),
            stream_timeout: Duration::from_secs(self.config.llm.timeouts.stream),
        }
    }

    pub fn build(self) -> Result<ConversationOrchestrator, AgentError> {
        let sandbox = self.build_sandbox()?;
        let registry = self.build_tool_registry(sandbox.clone())?;
        let llm = self.build_llm()?;
        tracing::info!(
            root = %sandbox.root().display(),
            tools = registry.len(),
            provider = %self.config.llm.provider,
            model = %self.config.llm.model,
            "agent ready"
        );
        Ok(ConversationOrchestrator::new(
            llm,
            ToolExecutor::new(registry, self.config.tools.tool_timeout_secs),
            Some(self.system_prompt()),
            self.limits(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(root: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.app.workspace_root = Some(root.to_path_buf());
        cfg.llm.provider = "mock".to_string();
        cfg
    }

    #[test]
    fn test_build_registers_fixed_tool_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let builder = AgentBuilder::new(config_for(dir.path()));
        let orch = builder.build().unwrap();
        assert_eq!(
            orch.executor().tool_names(),
            vec![
                "get_base_directory",
                "list_directory",
                "read_file",
                "write_file",
                "patch_file_lines",
                "go_install",
                "go_mod_tidy",
                "get_go_package_docs",
            ]
        );
        let system = orch.log().messages()[0].text();
        assert!(system.contains("migration_summary.md"));
    }

    #[test]
    fn test_missing_root_and_unknown_provider() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = AgentBuilder::new(config_for(&dir.path().join("nope")));
        assert!(matches!(missing.build(), Err(AgentError::Config(_))));

        let mut cfg = config_for(dir.path());
        cfg.llm.provider = "carrier-pigeon".to_string();
        assert!(matches!(
            AgentBuilder::new(cfg).build_llm(),
            Err(AgentError::Config(_))
        ));
    }
}
