use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::llm::provider::ProviderKind;

/// Deprecated Grok model name still found in older configs.
pub const DEPRECATED_GROK_MODEL: &str = "grok-beta";
/// Replacement for [`DEPRECATED_GROK_MODEL`].
pub const DEFAULT_GROK_MODEL: &str = "grok-3";
pub const DEFAULT_GROK_BASE_URL: &str = "https://api.x.ai/v1";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DirmindConfig {
    /// Sandbox root. Required to serve.
    pub watch_dir: Option<String>,
    pub memory_file: String,
    pub pending_edit_file: String,
    pub approval_file: String,
    pub context_limit: usize,
    pub server: ServerConfig,
    pub scan: ScanConfig,
    pub rate_limit: RateLimitConfig,
    pub edits: EditConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub log_file: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub max_dir_size_gb: u64,
    pub max_files_per_scan: usize,
    pub max_file_size_kb: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EditConfig {
    pub poll_interval_ms: u64,
    pub preview_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    pub timeout_seconds: u64,
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Per-provider defaults, looked up at call time.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
}

impl Default for DirmindConfig {
    fn default() -> Self {
        Self {
            watch_dir: None,
            memory_file: ".dirmind_memory.json".into(),
            pending_edit_file: ".dirmind_pending_edit.json".into(),
            approval_file: ".dirmind_approval.json".into(),
            context_limit: crate::memory::store::DEFAULT_CONTEXT_LIMIT,
            server: ServerConfig::default(),
            scan: ScanConfig::default(),
            rate_limit: RateLimitConfig::default(),
            edits: EditConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: "dirmind.log".into(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_dir_size_gb: 2,
            max_files_per_scan: 5,
            max_file_size_kb: 250,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_seconds: 60,
        }
    }
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            preview_chars: 500,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        let provider = |model: &str, base_url: &str| ProviderConfig {
            model: model.into(),
            base_url: base_url.into(),
        };
        let providers = BTreeMap::from([
            (
                "grok".to_string(),
                provider(DEFAULT_GROK_MODEL, DEFAULT_GROK_BASE_URL),
            ),
            (
                "openai".to_string(),
                provider("gpt-4o-mini", "https://api.openai.com/v1"),
            ),
            (
                "claude".to_string(),
                provider("claude-3-5-sonnet-20241022", "https://api.anthropic.com/v1"),
            ),
            (
                "ollama".to_string(),
                provider("llama3", "http://localhost:11434/v1"),
            ),
        ]);
        Self {
            default_provider: "grok".into(),
            timeout_seconds: 60,
            providers,
        }
    }
}

impl ScanConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_kb * 1024
    }

    pub fn max_dir_bytes(&self) -> u64 {
        self.max_dir_size_gb * 1_073_741_824
    }
}

/// Returns `~/.dirmind/`
pub fn default_dirmind_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dirmind")
}

/// Returns the default config file path: `~/.dirmind/config.toml`
pub fn default_config_path() -> PathBuf {
    default_dirmind_dir().join("config.toml")
}

impl DirmindConfig {
    /// Load config from `DIRMIND_CONFIG` or the default path, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("DIRMIND_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(path)
    }

    /// Load from a specific path, then apply env var overrides and normalization.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            DirmindConfig::default()
        };

        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (DIRMIND_WATCH_DIR, DIRMIND_LOG_LEVEL, DIRMIND_DEFAULT_PROVIDER).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DIRMIND_WATCH_DIR") {
            self.watch_dir = Some(val);
        }
        if let Ok(val) = std::env::var("DIRMIND_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("DIRMIND_DEFAULT_PROVIDER") {
            self.llm.default_provider = val;
        }
    }

    /// Clamp numeric ranges, fix an unknown default provider, and upgrade
    /// stale Grok settings.
    pub fn normalize(&mut self) {
        self.context_limit = self.context_limit.clamp(5, 100);
        self.scan.max_dir_size_gb = self.scan.max_dir_size_gb.clamp(1, 10);
        self.scan.max_files_per_scan = self.scan.max_files_per_scan.clamp(1, 100);
        self.scan.max_file_size_kb = self.scan.max_file_size_kb.clamp(1, 10_000);
        self.rate_limit.max_requests = self.rate_limit.max_requests.max(1);
        self.rate_limit.window_seconds = self.rate_limit.window_seconds.max(1);
        self.edits.poll_interval_ms = self.edits.poll_interval_ms.max(50);
        self.llm.timeout_seconds = self.llm.timeout_seconds.clamp(30, 60);

        if self.llm.default_provider.parse::<ProviderKind>().is_err() {
            warn!(
                provider = %self.llm.default_provider,
                "invalid default_provider, falling back to 'grok'"
            );
            self.llm.default_provider = "grok".into();
        }

        if let Some(grok) = self.llm.providers.get_mut("grok") {
            if grok.model.trim().is_empty() || grok.model == DEPRECATED_GROK_MODEL {
                info!(from = %grok.model, to = DEFAULT_GROK_MODEL, "upgrading grok model");
                grok.model = DEFAULT_GROK_MODEL.into();
            }
            if grok.base_url.trim().is_empty() {
                grok.base_url = DEFAULT_GROK_BASE_URL.into();
            }
        }
    }

    /// Validate `watch_dir` and prepare it as the sandbox root.
    ///
    /// A missing directory is created. Returns the canonical path.
    pub fn validate_sandbox(&self) -> Result<PathBuf> {
        let raw = match self.watch_dir.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => bail!("watch_dir is not configured"),
        };

        if looks_like_windows_path(raw) && !cfg!(windows) {
            bail!(
                "Windows-specific path '{raw}' configured on a non-Windows host; \
                 set watch_dir to a path valid on this system"
            );
        }

        let path = expand_tilde(raw);
        if path.exists() && !path.is_dir() {
            bail!("watch_dir is not a directory: {}", path.display());
        }
        if !path.exists() {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("failed to create watch_dir {}", path.display()))?;
            info!(path = %path.display(), "created watch_dir");
        }

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("failed to stat watch_dir {}", path.display()))?;
        if metadata.permissions().readonly() || std::fs::read_dir(&path).is_err() {
            bail!(
                "watch_dir must be readable and writable: {}",
                path.display()
            );
        }

        path.canonicalize()
            .with_context(|| format!("failed to resolve watch_dir {}", path.display()))
    }

    /// Resolve a sandbox-relative file setting against `root`.
    pub fn sandbox_file(&self, root: &Path, configured: &str) -> PathBuf {
        let candidate = expand_tilde(configured);
        if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        }
    }
}

fn looks_like_windows_path(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = DirmindConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.context_limit, 20);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.edits.poll_interval_ms, 2000);
        assert_eq!(config.llm.default_provider, "grok");
        assert_eq!(config.llm.providers.len(), 4);
        assert_eq!(config.scan.max_file_bytes(), 250 * 1024);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
watch_dir = "/tmp/project"
context_limit = 30

[server]
log_level = "debug"

[scan]
max_file_size_kb = 100

[llm]
default_provider = "openai"

[llm.providers.openai]
model = "gpt-4o"
base_url = "https://example.test/v1"
"#;
        let config: DirmindConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watch_dir.as_deref(), Some("/tmp/project"));
        assert_eq!(config.context_limit, 30);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.scan.max_file_size_kb, 100);
        assert_eq!(config.llm.default_provider, "openai");
        assert_eq!(config.llm.providers["openai"].model, "gpt-4o");
        // a providers table replaces the default set
        assert!(!config.llm.providers.contains_key("grok"));
        // defaults still apply for unset fields
        assert_eq!(config.scan.max_files_per_scan, 5);
    }

    #[test]
    fn normalize_upgrades_deprecated_grok_model() {
        let mut config = DirmindConfig::default();
        config.llm.providers.insert(
            "grok".into(),
            ProviderConfig {
                model: DEPRECATED_GROK_MODEL.into(),
                base_url: String::new(),
            },
        );
        config.normalize();
        let grok = &config.llm.providers["grok"];
        assert_eq!(grok.model, DEFAULT_GROK_MODEL);
        assert_eq!(grok.base_url, DEFAULT_GROK_BASE_URL);
    }

    #[test]
    fn normalize_falls_back_on_unknown_default_provider() {
        let mut config = DirmindConfig::default();
        config.llm.default_provider = "mystery".into();
        config.context_limit = 1000;
        config.normalize();
        assert_eq!(config.llm.default_provider, "grok");
        assert_eq!(config.context_limit, 100);
    }

    #[test]
    fn validate_requires_watch_dir() {
        let config = DirmindConfig::default();
        let err = config.validate_sandbox().unwrap_err();
        assert!(err.to_string().contains("watch_dir is not configured"));
    }

    #[cfg(not(windows))]
    #[test]
    fn validate_rejects_windows_path_on_unix() {
        let config = DirmindConfig {
            watch_dir: Some("C:/Temp".into()),
            ..Default::default()
        };
        let err = config.validate_sandbox().unwrap_err();
        assert!(err.to_string().contains("Windows-specific path"));
    }

    #[test]
    fn validate_rejects_file_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not_a_dir");
        std::fs::write(&file, "content").unwrap();
        let config = DirmindConfig {
            watch_dir: Some(file.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let err = config.validate_sandbox().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn validate_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("new_dir");
        let config = DirmindConfig {
            watch_dir: Some(target.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let resolved = config.validate_sandbox().unwrap();
        assert!(target.is_dir());
        assert_eq!(resolved, target.canonicalize().unwrap());
    }

    #[test]
    fn sandbox_file_joins_relative_paths() {
        let config = DirmindConfig::default();
        let root = Path::new("/srv/project");
        assert_eq!(
            config.sandbox_file(root, &config.memory_file),
            root.join(".dirmind_memory.json")
        );
        assert_eq!(
            config.sandbox_file(root, "/var/log/dirmind.log"),
            PathBuf::from("/var/log/dirmind.log")
        );
    }
}
