pub mod edit_file;
pub mod file_tools;
pub mod git_tools;
pub mod llm_query;
pub mod memory_tools;

use std::sync::Arc;

use edit_file::EditFileParams;
use file_tools::{ListDirectoryParams, ListFilesParams, ReadFileParams, SearchInFilesParams, WriteFileParams};
use git_tools::{GitCommitParams, GitDiffParams, GitLogParams};
use llm_query::LlmQueryParams;
use memory_tools::{GetRecentChangesParams, RecallParams, RememberParams};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ScanConfig;
use crate::edits::EditPipeline;
use crate::error::{ToolError, ToolResult};
use crate::llm::LlmRouter;
use crate::memory::SharedMemory;
use crate::sandbox::SandboxRoot;
use crate::watcher::RecentChanges;

/// Names of every tool, in the order they are listed to clients.
pub const TOOL_NAMES: [&str; 13] = [
    "list_directory",
    "read_file",
    "write_file",
    "edit_file",
    "list_files",
    "search_in_files",
    "git_diff",
    "git_commit",
    "git_log",
    "llm_query",
    "remember",
    "recall",
    "get_recent_changes",
];

/// Shared handler state and the single name-to-handler switch.
///
/// Handlers return [`ToolResult`]; [`ToolDispatcher::call`] flattens every
/// outcome to text so a failed call never ends the session.
#[derive(Clone)]
pub struct ToolDispatcher {
    pub(crate) sandbox: SandboxRoot,
    pub(crate) memory: SharedMemory,
    pub(crate) llm: Arc<LlmRouter>,
    pub(crate) edits: Arc<EditPipeline>,
    pub(crate) recent: RecentChanges,
    pub(crate) scan: ScanConfig,
}

impl ToolDispatcher {
    pub fn new(
        sandbox: SandboxRoot,
        memory: SharedMemory,
        llm: Arc<LlmRouter>,
        edits: Arc<EditPipeline>,
        recent: RecentChanges,
        scan: ScanConfig,
    ) -> Self {
        Self {
            sandbox,
            memory,
            llm,
            edits,
            recent,
            scan,
        }
    }

    pub fn sandbox(&self) -> &SandboxRoot {
        &self.sandbox
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    pub fn edits(&self) -> &EditPipeline {
        &self.edits
    }

    pub fn recent(&self) -> &RecentChanges {
        &self.recent
    }

    /// Run tool `name` with JSON `args`. Always yields text; failures are
    /// prefixed with `"Error: "`.
    pub async fn call(&self, name: &str, args: Value) -> String {
        tracing::debug!(tool = name, "tool call");
        render(name, self.dispatch(name, args).await)
    }

    async fn dispatch(&self, name: &str, args: Value) -> ToolResult<String> {
        match name {
            "list_directory" => self.list_directory(parse(args)?).await,
            "read_file" => self.read_file(parse(args)?).await,
            "write_file" => self.write_file(parse(args)?).await,
            "edit_file" => self.edit_file(parse(args)?).await,
            "list_files" => self.list_files(parse(args)?).await,
            "search_in_files" => self.search_in_files(parse(args)?).await,
            "git_diff" => self.git_diff(parse(args)?).await,
            "git_commit" => self.git_commit(parse(args)?).await,
            "git_log" => self.git_log(parse(args)?).await,
            "llm_query" => self.llm_query(parse(args)?).await,
            "remember" => self.remember(parse(args)?).await,
            "recall" => self.recall(parse(args)?).await,
            "get_recent_changes" => self.get_recent_changes(parse(args)?).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Decode arguments, treating `null` as `{}`.
fn parse<T: DeserializeOwned>(args: Value) -> ToolResult<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgument(e.to_string()))
}

/// Reject a blank required string argument.
fn required(value: &str, name: &'static str) -> ToolResult<()> {
    if value.trim().is_empty() {
        Err(ToolError::MissingArgument(name))
    } else {
        Ok(())
    }
}

fn render(name: &str, result: ToolResult<String>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "tool call failed");
            e.to_tool_text()
        }
    }
}

/// Convert a handler result for the MCP surface: failures become error
/// results carrying the same `"Error: ..."` text.
fn to_mcp(name: &str, result: ToolResult<String>) -> Result<String, String> {
    match result {
        Ok(text) => Ok(text),
        Err(e) => Err(render(name, Err(e))),
    }
}

/// The dirmind MCP tool handler. Wraps a [`ToolDispatcher`] and exposes
/// each tool via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct DirmindTools {
    tool_router: ToolRouter<Self>,
    dispatcher: ToolDispatcher,
}

#[tool_router]
impl DirmindTools {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self {
            tool_router: Self::tool_router(),
            dispatcher,
        }
    }

    #[tool(description = "List a directory in the watched tree. Hidden files and .gitignore matches are omitted.")]
    async fn list_directory(
        &self,
        Parameters(params): Parameters<ListDirectoryParams>,
    ) -> Result<String, String> {
        to_mcp("list_directory", self.dispatcher.list_directory(params).await)
    }

    #[tool(description = "Read a text file in the watched directory. Files above the size limit are rejected.")]
    async fn read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<String, String> {
        to_mcp("read_file", self.dispatcher.read_file(params).await)
    }

    #[tool(description = "Write a file in the watched directory. An existing file is first copied to <name>.bak.")]
    async fn write_file(
        &self,
        Parameters(params): Parameters<WriteFileParams>,
    ) -> Result<String, String> {
        to_mcp("write_file", self.dispatcher.write_file(params).await)
    }

    #[tool(description = "Replace the first occurrence of old_text with new_text. Without confirm=true the edit is proposed for approval and not applied.")]
    async fn edit_file(
        &self,
        Parameters(params): Parameters<EditFileParams>,
    ) -> Result<String, String> {
        to_mcp("edit_file", self.dispatcher.edit_file(params).await)
    }

    #[tool(description = "List files matching a glob pattern (e.g. '**/*.rs').")]
    async fn list_files(
        &self,
        Parameters(params): Parameters<ListFilesParams>,
    ) -> Result<String, String> {
        to_mcp("list_files", self.dispatcher.list_files(params).await)
    }

    #[tool(description = "Case-insensitive text search across files matching a glob pattern.")]
    async fn search_in_files(
        &self,
        Parameters(params): Parameters<SearchInFilesParams>,
    ) -> Result<String, String> {
        to_mcp("search_in_files", self.dispatcher.search_in_files(params).await)
    }

    #[tool(description = "Show uncommitted changes (git diff), optionally limited to some files.")]
    async fn git_diff(
        &self,
        Parameters(params): Parameters<GitDiffParams>,
    ) -> Result<String, String> {
        to_mcp("git_diff", self.dispatcher.git_diff(params).await)
    }

    #[tool(description = "Stage all changes and commit them with the given message.")]
    async fn git_commit(
        &self,
        Parameters(params): Parameters<GitCommitParams>,
    ) -> Result<String, String> {
        to_mcp("git_commit", self.dispatcher.git_commit(params).await)
    }

    #[tool(description = "Show recent commits, one line each.")]
    async fn git_log(
        &self,
        Parameters(params): Parameters<GitLogParams>,
    ) -> Result<String, String> {
        to_mcp("git_log", self.dispatcher.git_log(params).await)
    }

    #[tool(description = "Query an LLM provider (grok, openai, claude, ollama) with recent activity injected as context. Rate limited.")]
    async fn llm_query(
        &self,
        Parameters(params): Parameters<LlmQueryParams>,
    ) -> Result<String, String> {
        to_mcp("llm_query", self.dispatcher.llm_query(params).await)
    }

    #[tool(description = "Store a value in persistent memory under a category and key.")]
    async fn remember(
        &self,
        Parameters(params): Parameters<RememberParams>,
    ) -> Result<String, String> {
        to_mcp("remember", self.dispatcher.remember(params).await)
    }

    #[tool(description = "Retrieve memories: one entry (key + category), one category, or everything.")]
    async fn recall(
        &self,
        Parameters(params): Parameters<RecallParams>,
    ) -> Result<String, String> {
        to_mcp("recall", self.dispatcher.recall(params).await)
    }

    #[tool(description = "List recent file changes seen by the watcher.")]
    async fn get_recent_changes(
        &self,
        Parameters(params): Parameters<GetRecentChangesParams>,
    ) -> Result<String, String> {
        to_mcp("get_recent_changes", self.dispatcher.get_recent_changes(params).await)
    }
}

#[tool_handler]
impl ServerHandler for DirmindTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "dirmind gives sandboxed access to one directory: read, write and edit files, \
                 inspect git history, keep notes with remember/recall, and ask an LLM with \
                 recent activity as context. Edits without confirm=true wait for approval."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
