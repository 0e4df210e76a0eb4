//! Path sanitization for the sandbox root.
//!
//! Client paths are checked twice: lexically before they are joined to the
//! root, and again after the joined path is resolved on disk, so a symlink
//! inside the sandbox cannot be used to reach outside it. Dangling links are
//! followed too, since a write through one creates its target.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{ToolError, ToolResult};

/// Symlink hops followed before a path is refused.
const MAX_LINK_HOPS: usize = 40;

/// The single directory tree tools may read and write.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    root: PathBuf,
    /// Files inside the root owned by the backend. Tools may not write them.
    reserved: Arc<[PathBuf]>,
}

impl SandboxRoot {
    /// Canonicalize `root` and use it as the sandbox. The directory must exist.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self {
            root,
            reserved: Arc::from(Vec::new()),
        })
    }

    /// Mark backend-owned files as off limits for tool writes. Their `.tmp`
    /// siblings are covered as well.
    pub fn with_reserved(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut reserved = Vec::new();
        for file in files {
            reserved.push(crate::files::tmp_path(&file));
            reserved.push(file);
        }
        self.reserved = reserved.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a client-supplied relative path to an absolute path inside the root.
    pub fn resolve(&self, relative: &str) -> ToolResult<PathBuf> {
        let normalized = normalize(relative)?;
        let joined = self.root.join(&normalized);
        let resolved = resolve_existing_prefix(&joined)
            .map_err(|e| ToolError::io(&joined, e))?;

        if !resolved.starts_with(&self.root) {
            tracing::warn!(path = %relative, resolved = %resolved.display(), "blocked sandbox escape");
            return Err(ToolError::PathTraversal(relative.to_string()));
        }
        Ok(resolved)
    }

    /// Like [`resolve`](SandboxRoot::resolve), for paths a tool is about to
    /// write. Backend-owned files are refused.
    pub fn resolve_writable(&self, relative: &str) -> ToolResult<PathBuf> {
        let resolved = self.resolve(relative)?;
        if self.is_reserved(&resolved) {
            tracing::warn!(path = %relative, "blocked write to backend state file");
            return Err(ToolError::ReservedPath(relative.to_string()));
        }
        Ok(resolved)
    }

    pub fn is_reserved(&self, resolved: &Path) -> bool {
        self.reserved.iter().any(|p| p == resolved)
    }

    /// Path of `absolute` relative to the root, or `None` if it lies outside.
    pub fn relative(&self, absolute: &Path) -> Option<PathBuf> {
        absolute
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// Root-relative display form with forward slashes.
    pub fn display_relative(&self, absolute: &Path) -> String {
        match self.relative(absolute) {
            Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Some(rel) => rel.to_string_lossy().replace('\\', "/"),
            None => absolute.display().to_string(),
        }
    }
}

/// Lexically normalize a relative path. `.` segments are dropped; parent
/// segments and absolute forms are refused.
fn normalize(relative: &str) -> ToolResult<PathBuf> {
    let trimmed = relative.trim();
    let mut out = PathBuf::new();

    for component in Path::new(trimmed).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                return Err(ToolError::PathTraversal(relative.to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::InvalidPath(relative.to_string()));
            }
        }
    }
    Ok(out)
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// components that do not exist yet (targets of `write_file`, for instance).
/// A dangling symlink counts as existing and is followed to its target.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut current = path.to_path_buf();
    let mut missing = Vec::new();

    for _ in 0..MAX_LINK_HOPS {
        while current.symlink_metadata().is_err() {
            match (current.file_name(), current.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    current = parent.to_path_buf();
                }
                _ => break,
            }
        }

        match current.canonicalize() {
            Ok(mut resolved) => {
                for name in missing.into_iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) => {
                if !current.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
                    return Err(e);
                }
                let target = std::fs::read_link(&current)?;
                current = match current.parent() {
                    Some(parent) if target.is_relative() => parent.join(target),
                    _ => target,
                };
            }
        }
    }

    Err(std::io::Error::other("too many levels of symbolic links"))
}
