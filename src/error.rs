//! Tool-level error taxonomy.
//!
//! Every variant is recoverable: the dispatcher renders it as an
//! `"Error: ..."` text result and the session keeps running. Startup and
//! configuration failures use `anyhow` instead and are fatal.

use std::path::PathBuf;

/// A failure inside a tool handler.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Path traversal blocked: '{0}' resolves outside watch directory")]
    PathTraversal(String),

    #[error("Invalid path '{0}': Path must be relative and within watch directory")]
    InvalidPath(String),

    #[error("Access denied: '{0}' is managed by dirmind and cannot be written by tools")]
    ReservedPath(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path is not a file: {0}")]
    NotAFile(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("File too large ({size} bytes, limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("File is not valid UTF-8 text: {0}")]
    NotUtf8(String),

    #[error("Text not found in {0}: old_text must match the current file content exactly")]
    TextNotFound(String),

    #[error("Missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Git(String),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}

impl ToolError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Render as the text a tool caller sees.
    pub fn to_tool_text(&self) -> String {
        format!("Error: {self}")
    }
}

/// Shorthand for handler results.
pub type ToolResult<T> = Result<T, ToolError>;
