//! Backend lifecycle and the stdio MCP entry point.
//!
//! [`Backend`] owns everything a running server needs: the sandbox, the
//! shared memory store, the LLM router, the edit pipeline, the file watcher
//! and the approval monitor task. [`serve_stdio`] starts it, serves MCP until
//! the client disconnects or ctrl-c arrives, then shuts it down.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use rmcp::ServiceExt;
use tokio::task::JoinHandle;

use crate::config::DirmindConfig;
use crate::edits::EditPipeline;
use crate::llm::provider::ProviderKind;
use crate::llm::{LlmRouter, RateLimiter};
use crate::memory::{MemoryStore, SharedMemory};
use crate::sandbox::SandboxRoot;
use crate::tools::{DirmindTools, ToolDispatcher};
use crate::watcher::{ChangeRecorder, ChangeWatcher, RecentChanges};

/// Upper bound on waiting for the watcher thread at shutdown.
pub const WATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Files the backend writes inside the sandbox.
#[derive(Debug, Clone)]
pub struct StateFiles {
    pub memory: PathBuf,
    pub pending_edit: PathBuf,
    pub approval: PathBuf,
    pub log: PathBuf,
}

impl StateFiles {
    pub fn resolve(config: &DirmindConfig, root: &Path) -> Self {
        Self {
            memory: config.sandbox_file(root, &config.memory_file),
            pending_edit: config.sandbox_file(root, &config.pending_edit_file),
            approval: config.sandbox_file(root, &config.approval_file),
            log: config.sandbox_file(root, &config.server.log_file),
        }
    }

    fn all(&self) -> Vec<PathBuf> {
        vec![
            self.memory.clone(),
            self.pending_edit.clone(),
            self.approval.clone(),
            self.log.clone(),
        ]
    }
}

pub struct Backend {
    config: DirmindConfig,
    sandbox: SandboxRoot,
    files: StateFiles,
    memory: SharedMemory,
    recent: RecentChanges,
    edits: Arc<EditPipeline>,
    dispatcher: ToolDispatcher,
    watcher: Option<ChangeWatcher>,
    monitor: Option<JoinHandle<()>>,
}

impl Backend {
    /// Build the backend over `root` with an LLM router from config.
    /// Nothing runs in the background until [`start`](Backend::start).
    pub fn open(config: DirmindConfig, root: &Path) -> Result<Self> {
        let limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_seconds),
        );
        let llm = LlmRouter::new(config.llm.clone(), limiter);
        Self::open_with(config, root, llm)
    }

    /// Like [`open`](Backend::open) with a caller-supplied router.
    pub fn open_with(config: DirmindConfig, root: &Path, llm: LlmRouter) -> Result<Self> {
        let sandbox = SandboxRoot::new(root)
            .with_context(|| format!("failed to open sandbox root {}", root.display()))?;
        let files = StateFiles::resolve(&config, sandbox.path());
        let sandbox = sandbox.with_reserved(files.all());

        let store = MemoryStore::open(&files.memory, config.context_limit);
        tracing::info!(
            memory = %files.memory.display(),
            context = store.context_len(),
            "memory store ready"
        );
        let memory: SharedMemory = Arc::new(Mutex::new(store));

        warn_missing_default_key(&llm);
        let llm = Arc::new(llm);

        let edits = Arc::new(EditPipeline::new(
            sandbox.clone(),
            memory.clone(),
            &files.pending_edit,
            &files.approval,
            config.edits.preview_chars,
        ));
        let recent = RecentChanges::default();
        let dispatcher = ToolDispatcher::new(
            sandbox.clone(),
            memory.clone(),
            llm,
            edits.clone(),
            recent.clone(),
            config.scan.clone(),
        );

        Ok(Self {
            config,
            sandbox,
            files,
            memory,
            recent,
            edits,
            dispatcher,
            watcher: None,
            monitor: None,
        })
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn sandbox(&self) -> &SandboxRoot {
        &self.sandbox
    }

    pub fn state_files(&self) -> &StateFiles {
        &self.files
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Start the file watcher and the approval monitor. Must be called from
    /// within a tokio runtime. A watcher that fails to start is logged and
    /// skipped.
    pub fn start(&mut self) {
        if self.watcher.is_none() {
            let recorder = ChangeRecorder::new(
                self.sandbox.path(),
                self.memory.clone(),
                self.recent.clone(),
                self.files.all(),
            );
            match ChangeWatcher::start(self.sandbox.path(), recorder) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => tracing::warn!(error = %e, "file watcher unavailable, continuing without change tracking"),
            }
        }

        if self.monitor.is_none() {
            let interval = Duration::from_millis(self.config.edits.poll_interval_ms);
            self.monitor = Some(self.edits.clone().spawn_monitor(interval));
            tracing::info!(interval_ms = self.config.edits.poll_interval_ms, "approval monitor started");
        }
    }

    /// Stop background work: cancel and await the monitor, then stop the
    /// watcher, waiting at most [`WATCHER_STOP_TIMEOUT`].
    pub async fn shutdown(mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
            match monitor.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => tracing::debug!("approval monitor cancelled"),
                Err(e) => tracing::error!(error = %e, "approval monitor failed"),
            }
        }

        if let Some(watcher) = self.watcher.take() {
            if let Err(e) =
                tokio::task::spawn_blocking(move || watcher.stop(WATCHER_STOP_TIMEOUT)).await
            {
                tracing::error!(error = %e, "failed to stop file watcher");
            }
        }
        tracing::info!("backend stopped");
    }
}

fn warn_missing_default_key(llm: &LlmRouter) {
    let name = llm.default_provider();
    match name.parse::<ProviderKind>() {
        Ok(kind) if !llm.has_key(kind) => {
            if let Some(var) = kind.api_key_env() {
                tracing::warn!(provider = name, var, "API key for the default provider is not set");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(provider = name, error = %e, "default provider is not supported"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: DirmindConfig, root: &Path) -> Result<()> {
    tracing::info!(root = %root.display(), "starting dirmind MCP server on stdio");

    let mut backend = Backend::open(config, root)?;
    backend.start();

    let tools = DirmindTools::new(backend.dispatcher().clone());
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    tokio::select! {
        result = server.waiting() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "MCP session ended with an error");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            // Dropping the `waiting` future drops the session, which cancels it.
            tracing::info!("interrupt received, shutting down");
        }
    }

    backend.shutdown().await;
    tracing::info!("MCP server shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn state_files_live_in_the_sandbox() {
        let tmp = TempDir::new().unwrap();
        let config = DirmindConfig::default();
        let files = StateFiles::resolve(&config, tmp.path());
        assert_eq!(files.memory, tmp.path().join(".dirmind_memory.json"));
        assert_eq!(files.pending_edit, tmp.path().join(".dirmind_pending_edit.json"));
        assert_eq!(files.approval, tmp.path().join(".dirmind_approval.json"));
        assert_eq!(files.log, tmp.path().join("dirmind.log"));
    }

    #[tokio::test]
    async fn start_then_shutdown_is_clean() {
        let tmp = TempDir::new().unwrap();
        let mut backend = Backend::open(DirmindConfig::default(), tmp.path()).unwrap();
        backend.start();
        assert!(backend.monitor.is_some());
        backend.shutdown().await;
    }
}
