//! 沙箱文件系统工具
//!
//! WorkspaceSandbox 绑定单一根目录，所有路径参数必须是根目录本身或其后代（按路径分量比较，
//! 先做词法 `..` 归一化，再解析已存在祖先的符号链接），否则返回 InvalidPath 且不产生任何副作用。
//! 在其上提供 get_base_directory / list_directory / read_file / write_file / patch_file_lines 五个工具。

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::Tool;

/// patch_lines 的 line_end 哨兵：替换到文件末尾
pub const END_OF_FILE: i64 = -1;

/// 沙箱：进程（或测试夹具）生命周期内的根目录上下文，显式传入每个工具
#[derive(Debug, Clone)]
pub struct WorkspaceSandbox {
    root: PathBuf,
}

impl WorkspaceSandbox {
    /// 根目录必须存在；保存其规范化形式
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|_| ToolError::NotFound(format!("sandbox root '{}'", root.display())))?;
        if !root.is_dir() {
            return Err(ToolError::NotFound(format!(
                "sandbox root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 校验并解析路径：必须为绝对路径，且规范化后位于根目录之内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let raw = path.trim();
        if raw.is_empty() {
            return Err(ToolError::InvalidPath("empty path".to_string()));
        }
        let candidate = Path::new(raw);
        if !candidate.is_absolute() {
            return Err(ToolError::InvalidPath(format!(
                "'{}' is not an absolute path under {}",
                raw,
                self.root.display()
            )));
        }

        let normalized = normalize_lexically(candidate);
        let resolved = resolve_existing_ancestor(&normalized)
            .map_err(|_| ToolError::InvalidPath(format!("'{}' cannot be resolved", raw)))?;

        if is_within(&resolved, &self.root) {
            Ok(resolved)
        } else {
            Err(ToolError::InvalidPath(format!(
                "'{}' is outside {}",
                raw,
                self.root.display()
            )))
        }
    }

    /// 列出目录：文件名与子目录名（子目录带尾部 `/`），保持目录原生顺序
    pub fn list(&self, directory: &str) -> Result<Vec<String>, ToolError> {
        let dir = self.resolve(directory)?;
        if !dir.is_dir() {
            return Err(ToolError::NotFound(format!(
                "directory '{}' does not exist",
                directory
            )));
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            // 跟随符号链接：指向目录的链接也按目录标记
            if entry.path().is_dir() {
                entries.push(format!("{}/", name));
            } else {
                entries.push(name);
            }
        }
        Ok(entries)
    }

    pub fn read(&self, file_path: &str) -> Result<String, ToolError> {
        let path = self.resolve(file_path)?;
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::NotFound(format!("file '{}' does not exist", file_path)),
            _ => ToolError::Io(e),
        })
    }

    /// 整体覆盖写入；自动创建缺失的父目录
    pub fn write(&self, file_path: &str, content: &str) -> Result<(), ToolError> {
        let path = self.resolve(file_path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// 行区间替换：line_start 从 1 开始，line_end 不含，-1 表示到文件末尾。
    ///
    /// 结果为 `lines[..line_start-1] ++ new_lines ++ lines[line_end-1..]`，整体重写文件。
    /// 文件必须已存在（patch 从不创建文件）；任何区间错误都不会修改文件。
    pub fn patch_lines(
        &self,
        file_path: &str,
        new_lines: &[String],
        line_start: i64,
        line_end: i64,
    ) -> Result<(), ToolError> {
        let path = self.resolve(file_path)?;
        if !path.is_file() {
            return Err(ToolError::InvalidPath(format!(
                "'{}' is not an existing file",
                file_path
            )));
        }
        if line_start < 1 || (line_end < line_start && line_end != END_OF_FILE) {
            return Err(ToolError::InvalidRange(format!(
                "line_start={} line_end={}: line_start must be >= 1 and line_end >= line_start (or -1)",
                line_start, line_end
            )));
        }

        let original = std::fs::read_to_string(&path)?;
        let eol = if original.contains("\r\n") { "\r\n" } else { "\n" };
        let lines: Vec<&str> = original.lines().collect();
        let count = lines.len() as i64;

        let line_end = if line_end == END_OF_FILE { count + 1 } else { line_end };
        if line_end > count + 1 {
            return Err(ToolError::InvalidRange(format!(
                "line_end {} exceeds the number of lines in the file ({})",
                line_end, count
            )));
        }
        if line_start > count + 1 {
            return Err(ToolError::InvalidRange(format!(
                "line_start {} is past the end of the file ({} lines)",
                line_start, count
            )));
        }

        let prefix = &lines[..(line_start - 1) as usize];
        let suffix = &lines[(line_end - 1) as usize..];
        let updated: Vec<&str> = prefix
            .iter()
            .copied()
            .chain(new_lines.iter().map(String::as_str))
            .chain(suffix.iter().copied())
            .collect();

        let mut content = updated.join(eol);
        if !updated.is_empty() {
            content.push_str(eol);
        }
        std::fs::write(&path, content)?;
        Ok(())
    }
}

/// 词法归一化：去掉 `.`，`..` 弹出上一级（不越过根）
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// 规范化最长的已存在祖先（解析符号链接），再拼回尚不存在的尾部
fn resolve_existing_ancestor(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while std::fs::symlink_metadata(&existing).is_err() {
        match existing.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => break,
        }
        if !existing.pop() {
            break;
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

#[cfg(windows)]
fn is_within(path: &Path, root: &Path) -> bool {
    let lower = |p: &Path| PathBuf::from(p.to_string_lossy().to_lowercase());
    lower(path).starts_with(lower(root))
}

#[cfg(not(windows))]
fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct NoArgs {}

#[derive(Deserialize, JsonSchema)]
struct DirectoryArgs {
    /// Absolute path of a directory inside the base directory
    directory: String,
}

#[derive(Deserialize, JsonSchema)]
struct ReadFileArgs {
    /// Absolute path of the file to read
    file_path: String,
}

#[derive(Deserialize, JsonSchema)]
struct WriteFileArgs {
    /// Absolute path of the file to write
    file_path: String,
    /// Full new contents of the file
    content: String,
}

#[derive(Deserialize, JsonSchema)]
struct PatchLinesArgs {
    /// Absolute path of an existing file
    file_path: String,
    /// Replacement lines, one entry per line
    content_lines: Vec<String>,
    /// First line to replace (1-based)
    line_start: i64,
    /// Line after the last one to replace (exclusive); -1 means end of file
    line_end: i64,
}

/// 资源键：经沙箱解析后的路径，使 `..`、尾部分隔符与符号链接别名落到同一个键上；无法解析时不分道
pub(crate) fn path_key(sandbox: &WorkspaceSandbox, args: &Value, field: &str) -> Option<PathBuf> {
    let raw = args.get(field).and_then(|v| v.as_str())?;
    sandbox.resolve(raw).ok()
}

/// 返回沙箱根目录
pub struct GetBaseDirectoryTool {
    sandbox: Arc<WorkspaceSandbox>,
}

impl GetBaseDirectoryTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for GetBaseDirectoryTool {
    fn name(&self) -> &str {
        "get_base_directory"
    }

    fn description(&self) -> &str {
        "Returns the base directory which contains all relevant files. \
         This is also known as the current working directory. \
         No file operations outside of this directory are permitted; \
         all path arguments must be absolute paths under it."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<NoArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(Value::String(self.sandbox.root().display().to_string()))
    }
}

/// 列出目录
pub struct ListDirectoryTool {
    sandbox: Arc<WorkspaceSandbox>,
}

impl ListDirectoryTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "Returns a list of all files and directories in the specified directory. \
         Only names are returned, not full paths. \
         Subdirectories have a trailing slash."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<DirectoryArgs>()
    }

    fn resource_key(&self, args: &Value) -> Option<PathBuf> {
        path_key(&self.sandbox, args, "directory")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: DirectoryArgs = parse_args(args)?;
        tracing::info!(directory = %args.directory, "list_directory tool execute");
        let entries = self.sandbox.list(&args.directory)?;
        Ok(Value::from(entries))
    }
}

/// 读取文件
pub struct ReadFileTool {
    sandbox: Arc<WorkspaceSandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the contents of a file."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<ReadFileArgs>()
    }

    fn resource_key(&self, args: &Value) -> Option<PathBuf> {
        path_key(&self.sandbox, args, "file_path")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ReadFileArgs = parse_args(args)?;
        tracing::info!(file_path = %args.file_path, "read_file tool execute");
        Ok(Value::String(self.sandbox.read(&args.file_path)?))
    }
}

/// 写入文件（整体覆盖）
pub struct WriteFileTool {
    sandbox: Arc<WorkspaceSandbox>,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file. This completely overwrites the file if it exists. \
         If the file does not exist it is created, along with any necessary directories."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<WriteFileArgs>()
    }

    fn resource_key(&self, args: &Value) -> Option<PathBuf> {
        path_key(&self.sandbox, args, "file_path")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: WriteFileArgs = parse_args(args)?;
        tracing::info!(file_path = %args.file_path, bytes = args.content.len(), "write_file tool execute");
        self.sandbox.write(&args.file_path, &args.content)?;
        Ok(Value::Null)
    }
}

/// 按行区间替换文件内容
pub struct PatchFileLinesTool {
    sandbox: Arc<WorkspaceSandbox>,
}

impl PatchFileLinesTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for PatchFileLinesTool {
    fn name(&self) -> &str {
        "patch_file_lines"
    }

    fn description(&self) -> &str {
        "Replaces a range of lines in an existing file with the given lines. \
         line_start is 1-based; line_end is exclusive, so line_start = 1 and line_end = 2 \
         replaces only the first line, and line_end = line_start inserts before line_start. \
         line_end must not exceed the number of lines plus one; -1 means end of file."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<PatchLinesArgs>()
    }

    fn resource_key(&self, args: &Value) -> Option<PathBuf> {
        path_key(&self.sandbox, args, "file_path")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: PatchLinesArgs = parse_args(args)?;
        tracing::info!(
            file_path = %args.file_path,
            line_start = args.line_start,
            line_end = args.line_end,
            lines = args.content_lines.len(),
            "patch_file_lines tool execute"
        );
        self.sandbox.patch_lines(
            &args.file_path,
            &args.content_lines,
            args.line_start,
            args.line_end,
        )?;
        Ok(Value::Null)
    }
}
