//! Background file-change tracking for the sandbox.
//!
//! A native notify watcher runs on its own OS thread. Each create, modify, or
//! delete of a file under the sandbox root is appended to a 50-entry ring of
//! recent changes and to the memory store's rolling context.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;

use crate::memory::types::now_timestamp;
use crate::memory::{self, SharedMemory};

/// Capacity of the recent-changes ring.
pub const RECENT_CHANGES_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// One observed change, with a root-relative path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
    pub timestamp: String,
}

/// Bounded ring of the most recent changes, shared with the tool handlers.
#[derive(Debug, Clone, Default)]
pub struct RecentChanges {
    inner: Arc<Mutex<VecDeque<FileChange>>>,
}

impl RecentChanges {
    pub fn push(&self, change: FileChange) {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ring.push_back(change);
        while ring.len() > RECENT_CHANGES_CAPACITY {
            ring.pop_front();
        }
    }

    /// The last `count` changes, oldest first.
    pub fn tail(&self, count: usize) -> Vec<FileChange> {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let start = ring.len().saturating_sub(count);
        ring.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides what an event means and records it.
#[derive(Debug, Clone)]
pub struct ChangeRecorder {
    root: PathBuf,
    memory: SharedMemory,
    recent: RecentChanges,
    /// Files the backend itself writes (memory document, log). Recording
    /// their changes would feed back into the store on every save.
    ignored: Vec<PathBuf>,
}

impl ChangeRecorder {
    pub fn new(
        root: impl Into<PathBuf>,
        memory: SharedMemory,
        recent: RecentChanges,
        ignored: Vec<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            memory,
            recent,
            ignored,
        }
    }

    /// Record a change to `path`. Returns `false` when the path is ignored or
    /// lies outside the root.
    pub fn record(&self, kind: ChangeKind, path: &Path) -> bool {
        if self.is_ignored(path) {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.is_empty() {
            return false;
        }

        self.recent.push(FileChange {
            kind,
            path: relative.clone(),
            timestamp: now_timestamp(),
        });
        memory::lock(&self.memory).add_context(
            "file_change",
            serde_json::json!({ "type": kind.as_str(), "path": relative }),
        );
        tracing::debug!(kind = kind.as_str(), path = %relative, "file change");
        true
    }

    fn handle(&self, event: Event) {
        for path in &event.paths {
            if let Some(kind) = classify(&event.kind, path) {
                self.record(kind, path);
            }
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignored.iter().any(|p| path == p || is_temp_sibling(path, p)) {
            return true;
        }
        path.strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.components().next())
            .is_some_and(|first| first.as_os_str() == ".git")
    }
}

/// `memory.json.tmp` next to `memory.json`.
fn is_temp_sibling(path: &Path, target: &Path) -> bool {
    match (path.file_name(), target.file_name()) {
        (Some(name), Some(target_name)) => {
            path.parent() == target.parent()
                && name.to_string_lossy() == format!("{}.tmp", target_name.to_string_lossy())
        }
        _ => false,
    }
}

/// Map a notify event kind to a file-level change; directory and access
/// events are dropped.
fn classify(kind: &EventKind, path: &Path) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => None,
        EventKind::Create(_) if path.is_dir() => None,
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) if path.is_dir() => None,
        EventKind::Modify(_) if !path.exists() => Some(ChangeKind::Deleted),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Running watcher. Dropping or [`stop`](ChangeWatcher::stop)ping it ends
/// change tracking.
pub struct ChangeWatcher {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher").finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    /// Watch `root` recursively, feeding events to `recorder`.
    pub fn start(root: &Path, recorder: ChangeRecorder) -> notify::Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => recorder.handle(event),
            Err(e) => tracing::warn!(error = %e, "file watcher error"),
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "file watcher started");
        Ok(Self { watcher })
    }

    /// Stop the watcher, waiting at most `timeout` for its thread to wind
    /// down. Past that the thread is left to finish on its own.
    pub fn stop(self, timeout: Duration) {
        let (tx, rx) = std::sync::mpsc::channel();
        let watcher = self.watcher;
        std::thread::spawn(move || {
            drop(watcher);
            let _ = tx.send(());
        });
        match rx.recv_timeout(timeout) {
            Ok(()) => tracing::info!("file watcher stopped"),
            Err(_) => tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "file watcher did not stop in time, abandoning it"
            ),
        }
    }
}
