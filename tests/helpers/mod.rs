#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use dirmind::config::{DirmindConfig, LlmConfig, ProviderConfig};
use dirmind::llm::{KeySource, LlmRouter, RateLimiter};
use dirmind::server::Backend;
use tempfile::TempDir;

/// A backend over a fresh temp sandbox, with no background tasks running.
pub fn test_backend() -> (TempDir, Backend) {
    let tmp = TempDir::new().unwrap();
    let backend = Backend::open(DirmindConfig::default(), tmp.path()).unwrap();
    (tmp, backend)
}

/// A backend whose LLM router uses `router`.
pub fn test_backend_with_llm(router: LlmRouter) -> (TempDir, Backend) {
    let tmp = TempDir::new().unwrap();
    let backend = Backend::open_with(DirmindConfig::default(), tmp.path(), router).unwrap();
    (tmp, backend)
}

/// Router with every provider pointed at `base_url` and fixed test keys.
pub fn test_router(base_url: &str, max_requests: usize) -> LlmRouter {
    let mut config = LlmConfig::default();
    for provider in config.providers.values_mut() {
        provider.base_url = base_url.to_string();
    }
    config.timeout_seconds = 30;
    let keys = HashMap::from([
        ("XAI_API_KEY".to_string(), "xai-test".to_string()),
        ("OPENAI_API_KEY".to_string(), "sk-test".to_string()),
        ("ANTHROPIC_API_KEY".to_string(), "ant-test".to_string()),
    ]);
    LlmRouter::new(config, RateLimiter::new(max_requests, Duration::from_secs(60)))
        .with_keys(KeySource::Fixed(keys))
}

/// Router with a single provider entry and no keys at all.
pub fn keyless_router(name: &str, base_url: &str) -> LlmRouter {
    let mut config = LlmConfig::default();
    config.providers.clear();
    config.providers.insert(
        name.to_string(),
        ProviderConfig {
            model: "test-model".into(),
            base_url: base_url.into(),
        },
    );
    config.default_provider = name.to_string();
    LlmRouter::new(config, RateLimiter::default()).with_keys(KeySource::Fixed(HashMap::new()))
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}
