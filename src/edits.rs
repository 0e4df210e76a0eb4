//! Propose / approve / apply pipeline for text edits.
//!
//! An unconfirmed `edit_file` call writes a [`PendingEdit`] singleton into the
//! sandbox. The GUI answers by writing an [`ApprovalDecision`] singleton next
//! to it. The approval monitor polls for that decision, applies or discards
//! the edit, and removes both files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tokio::task::JoinHandle;

use crate::error::{ToolError, ToolResult};
use crate::files;
use crate::memory::types::now_timestamp;
use crate::memory::{self, SharedMemory};
use crate::sandbox::SandboxRoot;

/// How long an unparsable approval file is left alone before it is
/// discarded. The GUI writes it without locking, so a poll can land
/// mid-write.
pub const DECISION_SETTLE_TIME: Duration = Duration::from_secs(10);

/// A proposed replacement awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEdit {
    /// Sandbox-relative path as given by the caller.
    pub filepath: String,
    pub old_text: String,
    pub new_text: String,
    /// Unified diff of the whole file.
    pub diff: String,
    /// Start of the post-edit content, at most `preview_chars` characters.
    pub preview: String,
    pub timestamp: String,
}

/// The GUI's answer to a [`PendingEdit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default)]
    pub filepath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

impl ApprovalDecision {
    pub fn approve(filepath: impl Into<String>) -> Self {
        Self {
            approved: true,
            filepath: filepath.into(),
            old_text: None,
            new_text: None,
            reason: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn reject(filepath: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            approved: false,
            reason,
            ..Self::approve(filepath)
        }
    }
}

/// Result of an applied edit.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEdit {
    pub filepath: String,
    pub backup: String,
    pub diff: String,
}

/// What one poll of the approval file did.
#[derive(Debug)]
pub enum DecisionOutcome {
    Applied(AppliedEdit),
    Discarded { filepath: String },
    /// Approved, but the edit could not be applied. The file is untouched.
    Failed { filepath: String, error: ToolError },
    /// A decision arrived with no pending edit to act on.
    Orphaned,
}

#[derive(Debug)]
pub struct EditPipeline {
    sandbox: SandboxRoot,
    memory: SharedMemory,
    pending_path: PathBuf,
    approval_path: PathBuf,
    preview_chars: usize,
}

impl EditPipeline {
    pub fn new(
        sandbox: SandboxRoot,
        memory: SharedMemory,
        pending_path: impl Into<PathBuf>,
        approval_path: impl Into<PathBuf>,
        preview_chars: usize,
    ) -> Self {
        Self {
            sandbox,
            memory,
            pending_path: pending_path.into(),
            approval_path: approval_path.into(),
            preview_chars,
        }
    }

    pub fn pending_path(&self) -> &Path {
        &self.pending_path
    }

    pub fn approval_path(&self) -> &Path {
        &self.approval_path
    }

    /// Record a proposed edit as the pending singleton, replacing any
    /// earlier one. The target file is not modified.
    pub fn propose(&self, filepath: &str, old_text: &str, new_text: &str) -> ToolResult<PendingEdit> {
        let path = self.sandbox.resolve_writable(filepath)?;
        let original = files::read_existing_text(&self.sandbox, &path)?;
        let updated = replace_first(&original, old_text, new_text)
            .ok_or_else(|| ToolError::TextNotFound(filepath.to_string()))?;

        let pending = PendingEdit {
            filepath: filepath.to_string(),
            old_text: old_text.to_string(),
            new_text: new_text.to_string(),
            diff: unified_diff(filepath, &original, &updated),
            preview: updated.chars().take(self.preview_chars).collect(),
            timestamp: now_timestamp(),
        };

        let json = serde_json::to_vec_pretty(&pending)?;
        files::write_atomic(&self.pending_path, &json)
            .map_err(|e| ToolError::io(&self.pending_path, e))?;
        tracing::info!(filepath, "edit proposed, awaiting approval");
        Ok(pending)
    }

    /// Apply an edit immediately, bypassing approval.
    pub fn apply_now(&self, filepath: &str, old_text: &str, new_text: &str) -> ToolResult<AppliedEdit> {
        self.apply(filepath, old_text, new_text, "confirmed")
    }

    /// The pending edit on disk, if any and readable.
    pub fn pending(&self) -> Option<PendingEdit> {
        read_json(&self.pending_path)
    }

    /// Consume the approval file if present. Returns `None` when there is
    /// nothing to act on yet, including a decision that does not parse and
    /// is younger than [`DECISION_SETTLE_TIME`].
    pub fn process_decision_once(&self) -> Option<DecisionOutcome> {
        if !self.approval_path.exists() {
            return None;
        }
        let Some(decision) = read_json::<ApprovalDecision>(&self.approval_path) else {
            if self.approval_is_settling(SystemTime::now()) {
                tracing::debug!(path = %self.approval_path.display(), "approval file incomplete, retrying next poll");
                return None;
            }
            tracing::error!(path = %self.approval_path.display(), "discarding unreadable approval file");
            self.clear();
            return Some(DecisionOutcome::Orphaned);
        };
        let Some(pending) = self.pending() else {
            tracing::warn!(filepath = %decision.filepath, "approval received with no pending edit");
            self.clear();
            return Some(DecisionOutcome::Orphaned);
        };

        if !decision.filepath.is_empty() && decision.filepath != pending.filepath {
            tracing::warn!(
                decision = %decision.filepath,
                pending = %pending.filepath,
                "approval names a different file, using the pending edit"
            );
        }

        let outcome = if decision.approved {
            let old_text = decision.old_text.as_deref().unwrap_or(&pending.old_text);
            let new_text = decision.new_text.as_deref().unwrap_or(&pending.new_text);
            match self.apply(&pending.filepath, old_text, new_text, "approved") {
                Ok(applied) => DecisionOutcome::Applied(applied),
                Err(error) => {
                    tracing::warn!(filepath = %pending.filepath, error = %error, "approved edit could not be applied");
                    DecisionOutcome::Failed {
                        filepath: pending.filepath.clone(),
                        error,
                    }
                }
            }
        } else {
            tracing::info!(filepath = %pending.filepath, reason = ?decision.reason, "edit rejected");
            memory::lock(&self.memory).add_context(
                "file_edit_rejected",
                serde_json::json!({ "path": pending.filepath, "reason": decision.reason }),
            );
            DecisionOutcome::Discarded {
                filepath: pending.filepath.clone(),
            }
        };

        self.clear();
        Some(outcome)
    }

    /// True while the approval file may still be being written. A file whose
    /// age cannot be read is given the benefit of the doubt.
    fn approval_is_settling(&self, now: SystemTime) -> bool {
        let Ok(modified) = std::fs::metadata(&self.approval_path).and_then(|m| m.modified()) else {
            return true;
        };
        match now.duration_since(modified) {
            Ok(age) => age < DECISION_SETTLE_TIME,
            Err(_) => true,
        }
    }

    /// Poll for decisions every `interval` until the task is aborted.
    pub fn spawn_monitor(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pipeline = self.clone();
                match tokio::task::spawn_blocking(move || pipeline.process_decision_once()).await {
                    Ok(Some(outcome)) => tracing::debug!(?outcome, "approval processed"),
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "approval poll panicked"),
                }
            }
        })
    }

    /// Re-read the file, replace the first occurrence, back up, write.
    fn apply(&self, filepath: &str, old_text: &str, new_text: &str, how: &str) -> ToolResult<AppliedEdit> {
        let path = self.sandbox.resolve_writable(filepath)?;
        let original = files::read_existing_text(&self.sandbox, &path)?;
        let updated = replace_first(&original, old_text, new_text)
            .ok_or_else(|| ToolError::TextNotFound(filepath.to_string()))?;

        files::write_with_backup(&path, &updated)?;
        let backup = files::backup_path(&path);

        memory::lock(&self.memory).add_context(
            "file_edit",
            serde_json::json!({ "path": filepath, "mode": how }),
        );
        tracing::info!(filepath, mode = how, "edit applied");

        Ok(AppliedEdit {
            filepath: filepath.to_string(),
            backup: self.sandbox.display_relative(&backup),
            diff: unified_diff(filepath, &original, &updated),
        })
    }

    /// Remove both records. The approval goes last: its disappearance tells
    /// the GUI the decision has been handled.
    fn clear(&self) {
        for path in [&self.pending_path, &self.approval_path] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to remove edit record"),
            }
        }
    }
}

/// Replace the first occurrence only. An empty `old_text` never matches.
fn replace_first(content: &str, old_text: &str, new_text: &str) -> Option<String> {
    if old_text.is_empty() || !content.contains(old_text) {
        return None;
    }
    Some(content.replacen(old_text, new_text, 1))
}

fn unified_diff(filepath: &str, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{filepath}"), &format!("b/{filepath}"))
        .to_string()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse edit record");
            None
        }
    }
}
