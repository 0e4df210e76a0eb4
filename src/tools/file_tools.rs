use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{required, ToolDispatcher};
use crate::error::{ToolError, ToolResult};
use crate::files;
use crate::memory;

fn default_dir() -> String {
    ".".into()
}

fn default_pattern() -> String {
    "**/*".into()
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListDirectoryParams {
    #[schemars(description = "Directory relative to the watched root. Defaults to '.'")]
    #[serde(default = "default_dir")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    #[schemars(description = "Relative path to the file")]
    pub filepath: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    #[schemars(description = "Relative path to the file. Parent directories are created.")]
    pub filepath: String,

    #[schemars(description = "Full new content of the file")]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListFilesParams {
    #[schemars(description = "Glob pattern (e.g. '**/*.py'). Defaults to '**/*'")]
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchInFilesParams {
    #[schemars(description = "Text to search for (case-insensitive)")]
    pub query: String,

    #[schemars(description = "Glob pattern for files to search. Defaults to '**/*'")]
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl ToolDispatcher {
    pub(crate) async fn list_directory(&self, params: ListDirectoryParams) -> ToolResult<String> {
        let dir = self.sandbox.resolve(&params.path)?;
        let listing = files::list_directory(&self.sandbox, &dir)?;
        Ok(serde_json::to_string_pretty(&listing)?)
    }

    pub(crate) async fn read_file(&self, params: ReadFileParams) -> ToolResult<String> {
        required(&params.filepath, "filepath")?;
        let path = self.sandbox.resolve(&params.filepath)?;
        let content = files::read_text(&self.sandbox, &path, self.scan.max_file_bytes())?;

        memory::lock(&self.memory).add_context("file_read", json!({ "path": params.filepath }));
        tracing::info!(filepath = %params.filepath, bytes = content.len(), "read_file");
        Ok(content)
    }

    pub(crate) async fn write_file(&self, params: WriteFileParams) -> ToolResult<String> {
        required(&params.filepath, "filepath")?;
        let path = self.sandbox.resolve_writable(&params.filepath)?;
        if path.is_dir() {
            return Err(ToolError::NotAFile(params.filepath));
        }
        let backed_up = files::write_with_backup(&path, &params.content)?;

        memory::lock(&self.memory).add_context(
            "file_write",
            json!({ "path": params.filepath, "bytes": params.content.len() }),
        );
        tracing::info!(filepath = %params.filepath, bytes = params.content.len(), backed_up, "write_file");

        let mut message = format!(
            "Successfully wrote {} bytes to {}",
            params.content.len(),
            params.filepath
        );
        if backed_up {
            let backup = files::backup_path(&path);
            message.push_str(&format!(" (backup: {})", self.sandbox.display_relative(&backup)));
        }
        Ok(message)
    }

    pub(crate) async fn list_files(&self, params: ListFilesParams) -> ToolResult<String> {
        let sandbox = self.sandbox.clone();
        let scan = self.scan.clone();
        let list = tokio::task::spawn_blocking(move || files::list_files(&sandbox, &params.pattern, &scan))
            .await??;
        Ok(serde_json::to_string_pretty(&list)?)
    }

    pub(crate) async fn search_in_files(&self, params: SearchInFilesParams) -> ToolResult<String> {
        required(&params.query, "query")?;
        let sandbox = self.sandbox.clone();
        let scan = self.scan.clone();
        let report = tokio::task::spawn_blocking(move || {
            files::search(&sandbox, &params.query, &params.pattern, &scan)
        })
        .await??;
        Ok(serde_json::to_string_pretty(&report)?)
    }
}
