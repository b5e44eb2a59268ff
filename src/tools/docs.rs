//! 包文档查询工具
//!
//! 按 URL 模板（默认 https://pkg.go.dev/{package}）抓取页面，定位 class 包含指定名称（默认 UnitDoc）的首个 div，
//! 用 html2text（TrivialDecorator，不输出 markdown 标记）转为纯文本后按空白合并为单个字符串。
//! 纯查询：不缓存、不重试；超过 max_result_chars 时截断。

use std::sync::LazyLock;

use async_trait::async_trait;
use html2text::from_read_with_decorator;
use html2text::render::TrivialDecorator;
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::Tool;

const USER_AGENT: &str = concat!("migrator/", env!("CARGO_PKG_VERSION"));
const HTML_TEXT_WIDTH: usize = 120;

static DIV_WITH_CLASS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?is)<div\b[^>]*\bclass\s*=\s*["']([^"']*)["'][^>]*>"#).ok());
static DIV_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)div\b[^>]*>").ok());

#[derive(Deserialize, JsonSchema)]
struct DocsArgs {
    /// Package import path, e.g. github.com/google/uuid
    package: String,
}

/// 截取 class 列表包含 `class_name` 的首个 div（含嵌套 div 的完整区域）
pub fn extract_region<'a>(html: &'a str, class_name: &str) -> Option<&'a str> {
    let open = DIV_WITH_CLASS.as_ref()?;
    let tag = DIV_TAG.as_ref()?;

    let start = open
        .captures_iter(html)
        .find(|c| {
            c.get(1)
                .map(|m| m.as_str().split_whitespace().any(|cls| cls == class_name))
                .unwrap_or(false)
        })?
        .get(0)?;

    let mut depth = 0usize;
    for m in tag.captures_iter(&html[start.start()..]) {
        let whole = m.get(0)?;
        let closing = m.get(1).map(|g| !g.as_str().is_empty()).unwrap_or(false);
        if closing {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(&html[start.start()..start.start() + whole.end()]);
            }
        } else {
            depth += 1;
        }
    }
    // 未闭合：取到文档末尾
    Some(&html[start.start()..])
}

/// HTML 片段 → 空白合并的纯文本（标题、链接、列表、代码都只保留文字）
pub fn flatten_text(fragment: &str) -> String {
    let text = from_read_with_decorator(fragment.as_bytes(), HTML_TEXT_WIDTH, TrivialDecorator::new())
        .unwrap_or_default();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

/// 文档查询工具
pub struct PackageDocsTool {
    client: Client,
    url_template: String,
    content_class: String,
    max_result_chars: usize,
}

impl PackageDocsTool {
    pub fn new(
        url_template: impl Into<String>,
        content_class: impl Into<String>,
        timeout_secs: u64,
        max_result_chars: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url_template: url_template.into(),
            content_class: content_class.into(),
            max_result_chars,
        }
    }

    pub fn url_for(&self, package: &str) -> String {
        self.url_template.replace("{package}", package)
    }

    async fn fetch(&self, package: &str) -> Result<String, ToolError> {
        let url = self.url_for(package);
        tracing::info!(url = %url, "package docs fetch");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::UpstreamFailure(format!("request to {} failed: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(ToolError::UpstreamFailure(format!(
                "HTTP {} from {}",
                resp.status(),
                url
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::UpstreamFailure(format!("read body: {}", e)))?;

        let region = extract_region(&body, &self.content_class).ok_or_else(|| {
            ToolError::UpstreamFailure("Documentation not found in the package page.".to_string())
        })?;
        let text = flatten_text(region);
        if text.is_empty() {
            return Err(ToolError::UpstreamFailure(
                "No documentation text found.".to_string(),
            ));
        }
        Ok(truncate_chars(text, self.max_result_chars))
    }
}

#[async_trait]
impl Tool for PackageDocsTool {
    fn name(&self) -> &str {
        "get_go_package_docs"
    }

    fn description(&self) -> &str {
        "Get documentation for a Go package (its API reference text from pkg.go.dev)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<DocsArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: DocsArgs = parse_args(args)?;
        let package = args.package.trim();
        if package.is_empty() {
            return Err(ToolError::ArgumentError(
                "package cannot be empty".to_string(),
            ));
        }
        Ok(Value::String(self.fetch(package).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="Header">nav stuff</div>
        <div class="Documentation UnitDoc js-docs">
          <h2>Overview</h2>
          <div class="Overview"><p>Package uuid generates   and inspects UUIDs.</p></div>
          <p>func New() UUID</p>
        </div>
        <div class="Footer">footer</div>
    </body></html>"#;

    #[test]
    fn test_extract_region_handles_nesting() {
        let region = extract_region(PAGE, "UnitDoc").unwrap();
        assert!(region.starts_with(r#"<div class="Documentation UnitDoc js-docs">"#));
        assert!(region.ends_with("</div>"));
        assert!(region.contains("func New() UUID"));
        assert!(!region.contains("footer"));
        assert!(!region.contains("nav stuff"));
    }

    #[test]
    fn test_extract_region_requires_whole_class_name() {
        assert!(extract_region(PAGE, "Unit").is_none());
        assert!(extract_region("<p>no divs</p>", "UnitDoc").is_none());
    }

    #[test]
    fn test_flatten_joins_whitespace() {
        let region = extract_region(PAGE, "UnitDoc").unwrap();
        let text = flatten_text(region);
        assert!(text.contains("Package uuid generates and inspects UUIDs."));
        assert!(text.contains("func New() UUID"));
        assert!(!text.contains('\n'));
        assert!(!text.contains("  "));
    }

    #[test]
    fn test_flatten_drops_markup() {
        let region = r##"<div class="UnitDoc"><h2>Overview</h2><p>See <a href="/pkg#New">New</a> and <code>Parse</code>.</p><ul><li>one</li></ul></div>"##;
        let text = flatten_text(region);
        for word in ["Overview", "See", "New", "Parse", "one"] {
            assert!(text.contains(word), "{} missing from {:?}", word, text);
        }
        for markup in ["#", "[1]", "*", "`", "/pkg"] {
            assert!(!text.contains(markup), "{} left in {:?}", markup, text);
        }
    }

    #[test]
    fn test_truncate_and_url() {
        assert_eq!(truncate_chars("abcdef".into(), 3), "abc\n...[truncated]");
        assert_eq!(truncate_chars("abc".into(), 3), "abc");
        let tool = PackageDocsTool::new("https://pkg.go.dev/{package}", "UnitDoc", 5, 100);
        assert_eq!(tool.url_for("github.com/google/uuid"), "https://pkg.go.dev/github.com/google/uuid");
    }

    #[tokio::test]
    async fn test_empty_package_is_argument_error() {
        let tool = PackageDocsTool::new("http://127.0.0.1:9/{package}", "UnitDoc", 1, 100);
        let err = tool.execute(serde_json::json!({"package": " "})).await.unwrap_err();
        assert!(matches!(err, ToolError::ArgumentError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_upstream_failure() {
        let tool = PackageDocsTool::new("http://127.0.0.1:9/{package}", "UnitDoc", 2, 100);
        let err = tool.execute(serde_json::json!({"package": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::UpstreamFailure(_)));
    }
}
