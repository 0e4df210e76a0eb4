//! Rate-limited routing of prompts to a configured vendor.
//!
//! [`LlmRouter::query`] never fails: every problem (unknown provider, missing
//! key, throttling, HTTP or transport failure, unexpected response shape) is
//! returned as `"Error: ..."` text so the tool call itself always succeeds.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::{LlmConfig, ProviderConfig};
use crate::llm::provider::ProviderKind;
use crate::llm::rate_limit::RateLimiter;

/// Where API keys come from.
#[derive(Debug, Clone, Default)]
pub enum KeySource {
    /// Read the vendor's environment variable at call time.
    #[default]
    Env,
    /// Fixed keys by environment-variable name.
    Fixed(HashMap<String, String>),
}

impl KeySource {
    fn lookup(&self, var: &str) -> Option<String> {
        let value = match self {
            Self::Env => std::env::var(var).ok(),
            Self::Fixed(keys) => keys.get(var).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Provider '{0}' not configured")]
    NotConfigured(String),

    #[error("Provider '{0}' not implemented")]
    Unsupported(String),

    #[error("{0} environment variable not set")]
    MissingApiKey(&'static str),

    #[error("Rate limit exceeded. Please wait {0:.1} seconds.")]
    RateLimited(f64),

    #[error("{provider} request timed out after {seconds} seconds")]
    Timeout { provider: ProviderKind, seconds: u64 },

    #[error("Cannot connect to Ollama. Ensure Ollama is running at {0}")]
    OllamaUnreachable(String),

    #[error("{0}")]
    Api(String),

    #[error("{provider} query failed: {source}")]
    Transport {
        provider: ProviderKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0} returned an unexpected response shape")]
    Malformed(ProviderKind),
}

#[derive(Debug)]
pub struct LlmRouter {
    client: reqwest::Client,
    config: LlmConfig,
    limiter: Mutex<RateLimiter>,
    timeout: Duration,
    keys: KeySource,
}

impl LlmRouter {
    pub fn new(config: LlmConfig, limiter: RateLimiter) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            config,
            limiter: Mutex::new(limiter),
            timeout,
            keys: KeySource::Env,
        }
    }

    pub fn with_keys(mut self, keys: KeySource) -> Self {
        self.keys = keys;
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.config.default_provider
    }

    /// The provider name a call will use.
    pub fn resolve_name<'a>(&'a self, provider: Option<&'a str>) -> &'a str {
        provider
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(self.config.default_provider.as_str())
    }

    /// Whether the key a provider needs is present.
    pub fn has_key(&self, kind: ProviderKind) -> bool {
        kind.api_key_env()
            .is_none_or(|var| self.keys.lookup(var).is_some())
    }

    pub fn providers(&self) -> impl Iterator<Item = (&String, &ProviderConfig)> {
        self.config.providers.iter()
    }

    /// Requests currently counted against the rate window.
    pub fn requests_in_window(&self) -> usize {
        self.limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_window()
    }

    /// Send `prompt` (with optional leading `context`) to a provider and
    /// return the assistant's text or an `"Error: ..."` string.
    pub async fn query(
        &self,
        prompt: &str,
        provider: Option<&str>,
        model: Option<&str>,
        context: &str,
    ) -> String {
        let name = self.resolve_name(provider);
        match self.try_query(name, prompt, model, context).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(provider = %name, error = %e, "llm query failed");
                format!("Error: {e}")
            }
        }
    }

    async fn try_query(
        &self,
        name: &str,
        prompt: &str,
        model: Option<&str>,
        context: &str,
    ) -> Result<String, QueryError> {
        let conf = self
            .config
            .providers
            .get(name)
            .ok_or_else(|| QueryError::NotConfigured(name.to_string()))?;
        let kind: ProviderKind = name
            .parse()
            .map_err(|_| QueryError::Unsupported(name.to_string()))?;

        let api_key = match kind.api_key_env() {
            Some(var) => Some(self.keys.lookup(var).ok_or(QueryError::MissingApiKey(var))?),
            None => None,
        };

        self.admit()?;

        let model = model.filter(|m| !m.trim().is_empty()).unwrap_or(conf.model.as_str());
        let full_prompt = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{context}\n\n{prompt}")
        };

        tracing::info!(provider = %kind, model, prompt_len = full_prompt.len(), "llm query");
        self.send(kind, &conf.base_url, model, &full_prompt, api_key.as_deref())
            .await
    }

    fn admit(&self) -> Result<(), QueryError> {
        let mut limiter = self.limiter.lock().unwrap_or_else(PoisonError::into_inner);
        if limiter.acquire() {
            Ok(())
        } else {
            Err(QueryError::RateLimited(limiter.wait_time().as_secs_f64()))
        }
    }

    async fn send(
        &self,
        kind: ProviderKind,
        base_url: &str,
        model: &str,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<String, QueryError> {
        let request = self
            .client
            .post(kind.endpoint(base_url))
            .json(&kind.request_body(model, prompt));
        let request = kind.authorize(request, api_key);

        let response = request
            .send()
            .await
            .map_err(|e| self.classify(kind, base_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify(kind, base_url, e))?;

        if !status.is_success() {
            return Err(QueryError::Api(kind.describe_failure(
                status.as_u16(),
                &body,
                model,
            )));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| QueryError::Malformed(kind))?;
        kind.extract_text(&parsed).ok_or(QueryError::Malformed(kind))
    }

    fn classify(&self, kind: ProviderKind, base_url: &str, e: reqwest::Error) -> QueryError {
        if e.is_timeout() {
            QueryError::Timeout {
                provider: kind,
                seconds: self.timeout.as_secs(),
            }
        } else if e.is_connect() && kind == ProviderKind::Ollama {
            QueryError::OllamaUnreachable(base_url.to_string())
        } else {
            QueryError::Transport { provider: kind, source: e }
        }
    }
}
