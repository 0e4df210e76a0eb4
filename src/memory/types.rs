//! Memory record definitions.
//!
//! Defines [`MemoryEntry`] (one remembered value), [`ContextEntry`] (one item of
//! the rolling activity window), and [`MemoryDocument`] (the on-disk JSON shape
//! shared with the GUI).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category used when a caller does not name one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Memories grouped by category, then key.
pub type Categories = BTreeMap<String, BTreeMap<String, MemoryEntry>>;

/// A remembered value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Any JSON value supplied by the caller.
    pub value: serde_json::Value,
    /// ISO 8601 time of the last write.
    pub timestamp: String,
    /// Number of keyed recalls since the last write.
    #[serde(default)]
    pub access_count: u64,
}

/// One item of recent activity, e.g. a file change or a file read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Activity kind: `file_change`, `file_read`, `file_write`, `file_edit`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}

/// The whole persisted store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default)]
    pub memories: Categories,
    #[serde(default)]
    pub context: Vec<ContextEntry>,
}

/// Result of a recall, shaped by which filters were supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Recalled {
    /// Key and category given: `{key: entry}`, or empty when absent.
    Entry(BTreeMap<String, MemoryEntry>),
    /// Category only: that category's mapping.
    Category(BTreeMap<String, MemoryEntry>),
    /// No filters: every category.
    All(Categories),
}

impl Recalled {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Entry(m) | Self::Category(m) => m.is_empty(),
            Self::All(c) => c.is_empty(),
        }
    }

    /// The single entry of a keyed recall, if found.
    pub fn entry(&self) -> Option<&MemoryEntry> {
        match self {
            Self::Entry(m) => m.values().next(),
            _ => None,
        }
    }
}

/// Current time as an ISO 8601 string.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_entry_serializes_kind_as_type() {
        let entry = ContextEntry {
            kind: "file_read".into(),
            data: serde_json::json!({"path": "a.txt"}),
            timestamp: "2025-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "file_read");
        assert_eq!(json["data"]["path"], "a.txt");
    }

    #[test]
    fn document_tolerates_missing_sections() {
        let doc: MemoryDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.memories.is_empty());
        assert!(doc.context.is_empty());
    }
}
