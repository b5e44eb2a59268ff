//! 工具参数 JSON Schema 生成（schemars 自动生成）
//!
//! 每个工具用一个 `#[derive(Deserialize, JsonSchema)]` 参数结构体描述参数；
//! 字段文档注释即为参数说明，随 ToolDescriptor 发给模型。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::ToolError;

/// 由参数结构体生成 function parameters schema（去掉 $schema / title，保证有 properties）
pub fn parameters_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
        map.entry("type").or_insert_with(|| Value::String("object".into()));
        map.entry("properties")
            .or_insert_with(|| Value::Object(Default::default()));
    }
    value
}

/// 将已校验的参数反序列化为参数结构体
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::ArgumentError(e.to_string()))
}
