//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute 把任何失败（未知工具、参数错误、处理函数错误、超时）
//! 转为 ToolCallResult.error，保证编排器总能得到格式良好的结果；每次调用输出结构化审计日志（JSON）。
//!
//! execute_batch：同一轮的调用按资源键分道。资源键是沙箱解析后的路径，路径相同或互为祖先（目录与其下的文件）
//! 即视为冲突，冲突的调用按请求顺序串行（最后一个请求的写入生效）；互不相干的路径与无资源键的调用并发执行；
//! 结果按请求顺序返回。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::core::ToolError;
use crate::memory::{ToolCallRequest, ToolCallResult};
use crate::tools::{ToolDescriptor, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolCallResult
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行单个调用；永不返回 Err
    pub async fn execute(&self, call: &ToolCallRequest) -> ToolCallResult {
        let start = Instant::now();
        let result = timeout(
            self.timeout,
            self.registry.invoke(&call.tool_name, call.arguments.clone()),
        )
        .await
        .unwrap_or_else(|_| Err(ToolError::TimedOut(self.timeout.as_secs())));

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::TimedOut(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool_name,
            "call_id": call.call_id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(value) => ToolCallResult::ok(&call.call_id, value),
            Err(e) => ToolCallResult::err(&call.call_id, e.to_string()),
        }
    }

    /// 执行一轮中的全部调用：按资源键分道，道内串行、道间并发；返回顺序与请求顺序一致
    pub async fn execute_batch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let lanes = self.lanes(calls);
        let lane_futures = lanes.into_iter().map(|lane| async move {
            let mut out = Vec::with_capacity(lane.len());
            for idx in lane {
                out.push((idx, self.execute(&calls[idx]).await));
            }
            out
        });

        let mut indexed: Vec<(usize, ToolCallResult)> =
            join_all(lane_futures).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, r)| r).collect()
    }

    /// 按资源键分组（保持请求顺序）；一个调用与多条道冲突时把它们并成一道，无键调用各自独占一道
    fn lanes(&self, calls: &[ToolCallRequest]) -> Vec<Vec<usize>> {
        let mut lanes: Vec<Lane> = Vec::new();
        for (idx, call) in calls.iter().enumerate() {
            let Some(key) = self.registry.resource_key(&call.tool_name, &call.arguments) else {
                lanes.push(Lane {
                    keys: Vec::new(),
                    calls: vec![idx],
                });
                continue;
            };
            let key = normalize_key(&key);

            let conflicting: Vec<usize> = lanes
                .iter()
                .enumerate()
                .filter(|(_, lane)| lane.keys.iter().any(|k| overlaps(k, &key)))
                .map(|(i, _)| i)
                .collect();
            match conflicting.split_first() {
                None => lanes.push(Lane {
                    keys: vec![key],
                    calls: vec![idx],
                }),
                Some((&target, rest)) => {
                    for &i in rest.iter().rev() {
                        let merged = lanes.remove(i);
                        lanes[target].keys.extend(merged.keys);
                        lanes[target].calls.extend(merged.calls);
                    }
                    let lane = &mut lanes[target];
                    lane.calls.sort_unstable();
                    lane.calls.push(idx);
                    lane.keys.push(key);
                }
            }
        }
        lanes.into_iter().map(|lane| lane.calls).collect()
    }
}

struct Lane {
    keys: Vec<PathBuf>,
    calls: Vec<usize>,
}

/// 同一路径，或一方是另一方的祖先目录（按路径分量比较）
fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Windows 下路径比较忽略大小写
fn normalize_key(key: &Path) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(key.to_string_lossy().to_lowercase())
    } else {
        key.to_path_buf()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
