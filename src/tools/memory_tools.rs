use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{required, ToolDispatcher};
use crate::error::{ToolError, ToolResult};
use crate::memory;
use crate::memory::types::DEFAULT_CATEGORY;

/// Changes returned by `get_recent_changes` when no count is given.
const DEFAULT_CHANGE_COUNT: usize = 10;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RememberParams {
    #[schemars(description = "Memory key")]
    pub key: String,

    #[schemars(description = "Value to store. Any JSON value.")]
    pub value: serde_json::Value,

    #[schemars(description = "Memory category. Defaults to 'general'.")]
    pub category: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecallParams {
    #[schemars(description = "Specific memory key. Needs category to select one entry.")]
    pub key: Option<String>,

    #[schemars(description = "Memory category")]
    pub category: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetRecentChangesParams {
    #[schemars(description = "Number of changes to return. Defaults to 10.")]
    pub count: Option<usize>,
}

impl ToolDispatcher {
    pub(crate) async fn remember(&self, params: RememberParams) -> ToolResult<String> {
        required(&params.key, "key")?;
        if params.value.is_null() {
            return Err(ToolError::MissingArgument("value"));
        }
        let category = params
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CATEGORY);

        memory::lock(&self.memory).remember(&params.key, params.value, Some(category));
        Ok(format!(
            "Successfully stored memory: category={category}, key={}",
            params.key
        ))
    }

    pub(crate) async fn recall(&self, params: RecallParams) -> ToolResult<String> {
        let recalled =
            memory::lock(&self.memory).recall(params.key.as_deref(), params.category.as_deref());
        Ok(serde_json::to_string_pretty(&recalled)?)
    }

    pub(crate) async fn get_recent_changes(&self, params: GetRecentChangesParams) -> ToolResult<String> {
        let changes = self.recent.tail(params.count.unwrap_or(DEFAULT_CHANGE_COUNT));
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "count": changes.len(),
            "changes": changes,
        }))?)
    }
}
