//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MIGRATOR__*` 覆盖（双下划线表示嵌套，如 `MIGRATOR__LLM__MODEL=gpt-4.1`）。
//! API Key 不写入配置文件，只从 `llm.api_key_env` 指定的环境变量读取。

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：沙箱根目录、工具调用轮数上限、详细日志、系统提示词覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 沙箱根目录，未设置时用 ./example
    pub workspace_root: Option<PathBuf>,
    /// 单条用户消息内最多的「模型 → 工具 → 模型」轮数
    pub max_tool_rounds: usize,
    /// 输出 call / result 日志行
    pub verbose: bool,
    pub system_prompt: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            max_tool_rounds: 25,
            verbose: false,
            system_prompt: None,
        }
    }
}

/// [llm] 段：后端选择、模型、端点与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    /// 任意 OpenAI 兼容端点（含 Azure OpenAI 代理）
    pub base_url: Option<String>,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// 秒；request 为等待首个响应的时限，stream 为相邻流片段之间的最大间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [tools] 段：单次工具调用超时、包管理器、文档查询
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub package_manager: PackageManagerSection,
    pub docs: DocsSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 300,
            package_manager: PackageManagerSection::default(),
            docs: DocsSection::default(),
        }
    }
}

/// [tools.package_manager] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageManagerSection {
    pub program: String,
}

impl Default for PackageManagerSection {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
        }
    }
}

/// [tools.docs] 段：URL 模板（`{package}` 占位）、正文区域 class、超时、最大字符数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocsSection {
    pub url_template: String,
    pub content_class: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for DocsSection {
    fn default() -> Self {
        Self {
            url_template: "https://pkg.go.dev/{package}".to_string(),
            content_class: "UnitDoc".to_string(),
            timeout_secs: 20,
            max_result_chars: 20_000,
        }
    }
}

impl AppConfig {
    /// 沙箱根目录：配置值或 ./example
    pub fn workspace_root(&self) -> PathBuf {
        self.app
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("example"))
    }
}

/// 命令行覆盖项（两个二进制共用）
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(version, about = "Dependency migration assistant for Go workspaces")]
pub struct CliArgs {
    /// Extra TOML config file, layered over config/default.toml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Workspace root directory the tools are confined to
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Print tool calls and results to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn apply(&self, cfg: &mut AppConfig) {
        if self.verbose {
            cfg.app.verbose = true;
        }
        if let Some(root) = &self.root {
            cfg.app.workspace_root = Some(root.clone());
        }
    }
}

/// 从 config 目录加载配置，环境变量 MIGRATOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MIGRATOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MIGRATOR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
