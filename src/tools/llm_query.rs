use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{required, ToolDispatcher};
use crate::error::ToolResult;
use crate::memory;
use crate::memory::store::DEFAULT_CONTEXT_COUNT;
use crate::memory::types::now_timestamp;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LlmQueryParams {
    #[schemars(description = "Prompt for the LLM")]
    pub prompt: String,

    #[schemars(description = "LLM provider: grok, openai, claude or ollama. Defaults to the configured provider.")]
    pub provider: Option<String>,

    #[schemars(description = "Model override for this call")]
    pub model: Option<String>,
}

impl ToolDispatcher {
    pub(crate) async fn llm_query(&self, params: LlmQueryParams) -> ToolResult<String> {
        required(&params.prompt, "prompt")?;
        let provider = self.llm.resolve_name(params.provider.as_deref()).to_string();

        let context = {
            let store = memory::lock(&self.memory);
            serde_json::to_string_pretty(&store.get_context(DEFAULT_CONTEXT_COUNT))?
        };

        let response = self
            .llm
            .query(&params.prompt, Some(&provider), params.model.as_deref(), &context)
            .await;

        if response.starts_with("Error: ") {
            return Ok(response);
        }

        let timestamp = now_timestamp();
        let mut store = memory::lock(&self.memory);
        store.remember(
            &format!("{provider}_{timestamp}"),
            json!(response),
            Some("llm"),
        );
        store.remember(
            &format!("chat_{timestamp}"),
            json!({
                "prompt": params.prompt,
                "response": response,
                "provider": provider,
                "timestamp": timestamp,
                "context_used": context,
            }),
            Some("conversations"),
        );
        Ok(response)
    }
}
