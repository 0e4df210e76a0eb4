use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{required, ToolDispatcher};
use crate::error::{ToolError, ToolResult};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EditFileParams {
    #[schemars(description = "Relative path to the file")]
    pub filepath: String,

    #[schemars(description = "Exact text to replace. Only its first occurrence is changed.")]
    pub old_text: String,

    #[schemars(description = "Replacement text")]
    pub new_text: String,

    #[schemars(
        description = "Apply immediately. When false or omitted the edit is written as a pending proposal for the user to approve."
    )]
    #[serde(default)]
    pub confirm: bool,
}

impl ToolDispatcher {
    pub(crate) async fn edit_file(&self, params: EditFileParams) -> ToolResult<String> {
        required(&params.filepath, "filepath")?;
        if params.old_text.is_empty() {
            return Err(ToolError::MissingArgument("old_text"));
        }

        if params.confirm {
            let applied = self
                .edits
                .apply_now(&params.filepath, &params.old_text, &params.new_text)?;
            return Ok(format!(
                "Edit applied to {} (backup: {})\n\n{}",
                applied.filepath, applied.backup, applied.diff
            ));
        }

        let pending = self
            .edits
            .propose(&params.filepath, &params.old_text, &params.new_text)?;
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "status": "pending_approval",
            "pending_edit": pending,
        }))?)
    }
}
