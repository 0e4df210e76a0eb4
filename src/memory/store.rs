//! Persistent categorized memory plus the rolling context window.
//!
//! [`MemoryStore`] is the sole writer of its JSON document. Every mutation
//! rewrites the whole document. Persistence is best-effort: a document that
//! cannot be read loads as an empty store, and a failed write is logged and
//! swallowed, so callers never see an I/O error from this module.

use std::path::{Path, PathBuf};

use crate::memory::types::{
    now_timestamp, ContextEntry, MemoryDocument, MemoryEntry, Recalled, DEFAULT_CATEGORY,
};

/// Default size of the rolling context window.
pub const DEFAULT_CONTEXT_LIMIT: usize = 20;

/// Default number of context entries handed to an LLM.
pub const DEFAULT_CONTEXT_COUNT: usize = 5;

#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    doc: MemoryDocument,
    limit: usize,
}

impl MemoryStore {
    /// Open the document at `path`. Missing, unreadable, or corrupt documents
    /// yield an empty store.
    pub fn open(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let limit = limit.max(1);
        let mut doc = load_document(&path);
        truncate_front(&mut doc.context, limit);

        tracing::info!(
            path = %path.display(),
            categories = doc.memories.len(),
            context = doc.context.len(),
            "memory store opened"
        );
        Self { path, doc, limit }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Upsert `key` in `category`, resetting its access count.
    pub fn remember(&mut self, key: &str, value: serde_json::Value, category: Option<&str>) {
        let category = category.unwrap_or(DEFAULT_CATEGORY);
        self.doc.memories.entry(category.to_string()).or_default().insert(
            key.to_string(),
            MemoryEntry {
                value,
                timestamp: now_timestamp(),
                access_count: 0,
            },
        );
        self.save();
        tracing::debug!(category, key, "stored memory");
    }

    /// Look up memories.
    ///
    /// With both `key` and `category`, returns that single entry and bumps its
    /// access count (a write). With only `category`, returns the category. With
    /// neither (or only `key`), returns everything.
    pub fn recall(&mut self, key: Option<&str>, category: Option<&str>) -> Recalled {
        match (key, category) {
            (Some(key), Some(category)) => {
                let hit = self
                    .doc
                    .memories
                    .get_mut(category)
                    .and_then(|entries| entries.get_mut(key))
                    .map(|entry| {
                        entry.access_count += 1;
                        entry.clone()
                    });
                match hit {
                    Some(entry) => {
                        self.save();
                        Recalled::Entry([(key.to_string(), entry)].into_iter().collect())
                    }
                    None => Recalled::Entry(Default::default()),
                }
            }
            (_, Some(category)) => Recalled::Category(
                self.doc.memories.get(category).cloned().unwrap_or_default(),
            ),
            _ => Recalled::All(self.doc.memories.clone()),
        }
    }

    /// Append to the rolling window, evicting the oldest entries past the limit.
    pub fn add_context(&mut self, kind: &str, data: serde_json::Value) {
        self.doc.context.push(ContextEntry {
            kind: kind.to_string(),
            data,
            timestamp: now_timestamp(),
        });
        truncate_front(&mut self.doc.context, self.limit);
        self.save();
    }

    /// The most recent `count` context entries, oldest first.
    pub fn get_context(&self, count: usize) -> Vec<ContextEntry> {
        let start = self.doc.context.len().saturating_sub(count);
        self.doc.context[start..].to_vec()
    }

    pub fn context_len(&self) -> usize {
        self.doc.context.len()
    }

    /// Rewrite the backing document. Failures are logged, not returned.
    fn save(&self) {
        if let Err(e) = write_document(&self.path, &self.doc) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to save memory file");
        }
    }
}

fn load_document(path: &Path) -> MemoryDocument {
    if !path.exists() {
        return MemoryDocument::default();
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read memory file");
            return MemoryDocument::default();
        }
    };
    if contents.trim().is_empty() {
        return MemoryDocument::default();
    }
    match serde_json::from_str(&contents) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse memory file");
            MemoryDocument::default()
        }
    }
}

/// Written through a temp sibling so the GUI never polls a half-written file.
fn write_document(path: &Path, doc: &MemoryDocument) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(doc).map_err(std::io::Error::other)?;
    crate::files::write_atomic(path, &json)
}

fn truncate_front<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_store(limit: usize) -> (TempDir, MemoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path().join("memory.json"), limit);
        (tmp, store)
    }

    #[test]
    fn remember_then_recall_counts_access() {
        let (_tmp, mut store) = test_store(20);
        store.remember("lang", json!("rust"), Some("prefs"));

        let first = store.recall(Some("lang"), Some("prefs"));
        let entry = first.entry().unwrap();
        assert_eq!(entry.value, json!("rust"));
        assert_eq!(entry.access_count, 1);

        let second = store.recall(Some("lang"), Some("prefs"));
        assert_eq!(second.entry().unwrap().access_count, 2);
    }

    #[test]
    fn bulk_recall_does_not_count_access() {
        let (_tmp, mut store) = test_store(20);
        store.remember("k", json!(1), None);

        let _ = store.recall(None, Some(DEFAULT_CATEGORY));
        let _ = store.recall(None, None);

        let keyed = store.recall(Some("k"), Some(DEFAULT_CATEGORY));
        assert_eq!(keyed.entry().unwrap().access_count, 1);
    }

    #[test]
    fn overwrite_resets_access_count() {
        let (_tmp, mut store) = test_store(20);
        store.remember("k", json!("a"), None);
        let _ = store.recall(Some("k"), Some("general"));
        store.remember("k", json!("b"), None);

        let Recalled::Category(entries) = store.recall(None, Some("general")) else {
            panic!("expected category recall");
        };
        assert_eq!(entries["k"].value, json!("b"));
        assert_eq!(entries["k"].access_count, 0);
    }

    #[test]
    fn recall_missing_key_is_empty() {
        let (_tmp, mut store) = test_store(20);
        assert!(store.recall(Some("nope"), Some("general")).is_empty());
        assert!(store.recall(None, Some("nope")).is_empty());
    }

    #[test]
    fn key_without_category_returns_everything() {
        let (_tmp, mut store) = test_store(20);
        store.remember("a", json!(1), Some("x"));
        store.remember("b", json!(2), Some("y"));
        let Recalled::All(all) = store.recall(Some("a"), None) else {
            panic!("expected full recall");
        };
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn context_window_keeps_last_limit_entries() {
        let (_tmp, mut store) = test_store(5);
        for i in 0..8 {
            store.add_context("tick", json!(i));
        }
        assert_eq!(store.context_len(), 5);

        let ctx = store.get_context(5);
        let values: Vec<_> = ctx.iter().map(|c| c.data.clone()).collect();
        assert_eq!(values, vec![json!(3), json!(4), json!(5), json!(6), json!(7)]);
    }

    #[test]
    fn get_context_returns_most_recent_last() {
        let (_tmp, mut store) = test_store(20);
        store.add_context("file_read", json!({"path": "a"}));
        store.add_context("file_write", json!({"path": "b"}));
        store.add_context("file_change", json!({"path": "c"}));

        let ctx = store.get_context(2);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].kind, "file_write");
        assert_eq!(ctx[1].kind, "file_change");
        assert!(store.get_context(100).len() == 3);
    }

    #[test]
    fn document_round_trips_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        {
            let mut store = MemoryStore::open(&path, 20);
            store.remember("k", json!({"nested": true}), Some("cat"));
            store.add_context("file_read", json!({"path": "x"}));
        }

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["memories"]["cat"]["k"].is_object());
        assert_eq!(raw["context"][0]["type"], "file_read");

        let mut reopened = MemoryStore::open(&path, 20);
        let hit = reopened.recall(Some("k"), Some("cat"));
        assert_eq!(hit.entry().unwrap().value, json!({"nested": true}));
        assert_eq!(reopened.context_len(), 1);
    }

    #[test]
    fn corrupt_document_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut store = MemoryStore::open(&path, 20);
        assert!(store.recall(None, None).is_empty());
        assert_eq!(store.context_len(), 0);
    }

    #[test]
    fn failed_writes_are_swallowed() {
        let tmp = TempDir::new().unwrap();
        // A directory at the document path makes every save fail.
        let path = tmp.path().join("memory.json");
        std::fs::create_dir(&path).unwrap();

        let mut store = MemoryStore::open(&path, 20);
        store.remember("k", json!("v"), None);
        store.add_context("file_read", json!({}));

        let hit = store.recall(Some("k"), Some("general"));
        assert_eq!(hit.entry().unwrap().value, json!("v"));
        assert_eq!(store.context_len(), 1);
        assert!(path.is_dir());
    }
}
