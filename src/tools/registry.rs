//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! invoke 在调用处理函数之前先用 JSON Schema 校验参数，ToolExecutor 在其上加超时与审计日志。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::ToolError;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（注册表内唯一）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 本次调用触及的资源（沙箱解析后的文件或目录路径）。同一轮中路径相同或互为祖先的调用按请求顺序串行执行
    fn resource_key(&self, _args: &Value) -> Option<PathBuf> {
        None
    }

    /// 执行工具；参数已通过 schema 校验
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// 工具描述符：启动时从注册的工具生成，进程生命周期内不变
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: jsonschema::Validator,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，保留注册顺序
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具会替换旧实现但保留原位置。schema 本身非法时返回 ArgumentError
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        let schema = tool.parameters_schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            ToolError::ArgumentError(format!("invalid parameter schema for '{}': {}", name, e))
        })?;
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(
            name,
            RegisteredTool {
                tool: Arc::new(tool),
                validator,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.tool.clone())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 按注册顺序返回全部描述符（随每次模型请求一起发送）
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDescriptor {
                name: t.tool.name().to_string(),
                description: t.tool.description().to_string(),
                parameters: t.tool.parameters_schema(),
            })
            .collect()
    }

    /// 工具调用涉及的资源键；未知工具返回 None
    pub fn resource_key(&self, name: &str, args: &Value) -> Option<PathBuf> {
        self.tools.get(name).and_then(|t| t.tool.resource_key(args))
    }

    /// 按名调用：未知工具 → UnknownTool；参数缺失或类型不符 → ArgumentError（处理函数不会运行）
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args = match args {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        if !args.is_object() {
            return Err(ToolError::ArgumentError(format!(
                "arguments for '{}' must be a JSON object, got: {}",
                name, args
            )));
        }
        let problems: Vec<String> = registered
            .validator
            .iter_errors(&args)
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(ToolError::ArgumentError(problems.join("; ")));
        }

        registered.tool.execute(args).await
    }
}
