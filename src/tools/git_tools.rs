use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{required, ToolDispatcher};
use crate::error::ToolResult;
use crate::git;
use crate::memory;

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct GitDiffParams {
    #[schemars(description = "Optional list of relative paths to limit the diff to")]
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GitCommitParams {
    #[schemars(description = "Commit message")]
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct GitLogParams {
    #[schemars(description = "Number of commits to show. Defaults to 10.")]
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ToolDispatcher {
    pub(crate) async fn git_diff(&self, params: GitDiffParams) -> ToolResult<String> {
        let files = params.files.unwrap_or_default();
        // Paths go to git verbatim, so they get the same sandbox check as file tools.
        for file in &files {
            self.sandbox.resolve(file)?;
        }
        git::diff(self.sandbox.path(), &files).await
    }

    pub(crate) async fn git_commit(&self, params: GitCommitParams) -> ToolResult<String> {
        required(&params.message, "message")?;
        let out = git::commit(self.sandbox.path(), &params.message).await?;
        memory::lock(&self.memory).add_context("git_commit", json!({ "message": params.message }));
        tracing::info!(message = %params.message, "git_commit");
        Ok(out)
    }

    pub(crate) async fn git_log(&self, params: GitLogParams) -> ToolResult<String> {
        let limit = params.limit.unwrap_or(git::DEFAULT_LOG_LIMIT);
        git::log(self.sandbox.path(), limit).await
    }
}
