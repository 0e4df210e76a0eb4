//! Filesystem operations behind the file tools.
//!
//! All paths taken here are already resolved by [`SandboxRoot::resolve`].
//! Writes follow a backup-then-write discipline: an existing file is copied
//! to a `.bak` sibling before it is overwritten.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use ignore::gitignore::Gitignore;
use ignore::Match;
use ignore::WalkBuilder;
use serde::Serialize;

use crate::config::ScanConfig;
use crate::error::{ToolError, ToolResult};
use crate::sandbox::SandboxRoot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Dir,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct DirListing {
    pub path: String,
    pub entries: Vec<DirEntry>,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<String>,
    pub count: usize,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchMatch {
    pub filepath: String,
}

#[derive(Debug, Serialize)]
pub struct SearchReport {
    pub query: String,
    pub matches: Vec<SearchMatch>,
    pub files_searched: usize,
    pub truncated: bool,
}

/// `notes.txt` → `notes.txt.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// `<name>.tmp`, the staging sibling used by [`write_atomic`].
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write through a temp sibling and rename into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, contents)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// List one directory, hiding dotfiles and `.gitignore` matches.
pub fn list_directory(sandbox: &SandboxRoot, dir: &Path) -> ToolResult<DirListing> {
    if !dir.exists() {
        return Err(ToolError::NotFound(sandbox.display_relative(dir)));
    }
    if !dir.is_dir() {
        return Err(ToolError::NotADirectory(sandbox.display_relative(dir)));
    }

    let gitignores = load_gitignores(sandbox.path(), dir);
    let read = std::fs::read_dir(dir).map_err(|e| ToolError::io(dir, e))?;

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| ToolError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let is_dir = metadata.is_dir();
        if is_gitignored(&gitignores, &path, is_dir) {
            continue;
        }
        entries.push(DirEntry {
            name,
            entry_type: if is_dir { EntryType::Dir } else { EntryType::File },
            size: if is_dir { 0 } else { metadata.len() },
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(DirListing {
        path: sandbox.display_relative(dir),
        entries,
    })
}

/// Read a UTF-8 text file no larger than `max_bytes`.
pub fn read_text(sandbox: &SandboxRoot, path: &Path, max_bytes: u64) -> ToolResult<String> {
    let shown = sandbox.display_relative(path);
    if !path.exists() {
        return Err(ToolError::NotFound(shown));
    }
    if !path.is_file() {
        return Err(ToolError::NotAFile(shown));
    }
    let size = std::fs::metadata(path)
        .map_err(|e| ToolError::io(path, e))?
        .len();
    if size > max_bytes {
        return Err(ToolError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }
    let bytes = std::fs::read(path).map_err(|e| ToolError::io(path, e))?;
    String::from_utf8(bytes).map_err(|_| ToolError::NotUtf8(shown))
}

/// Read a text file with no size cap (edit targets).
pub fn read_existing_text(sandbox: &SandboxRoot, path: &Path) -> ToolResult<String> {
    read_text(sandbox, path, u64::MAX)
}

/// Copy an existing file to its `.bak` sibling, then write `content`.
/// Parent directories are created for new files. Returns whether a backup
/// was made.
pub fn write_with_backup(path: &Path, content: &str) -> ToolResult<bool> {
    let backed_up = if path.is_file() {
        let backup = backup_path(path);
        std::fs::copy(path, &backup).map_err(|e| ToolError::io(&backup, e))?;
        true
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ToolError::io(parent, e))?;
        }
        false
    };
    std::fs::write(path, content).map_err(|e| ToolError::io(path, e))?;
    Ok(backed_up)
}

/// Files under the root matching `pattern`, up to the scan limit.
pub fn list_files(sandbox: &SandboxRoot, pattern: &str, scan: &ScanConfig) -> ToolResult<FileList> {
    let matcher = compile_glob(pattern)?;
    let max = scan.max_files_per_scan;

    let mut files = Vec::new();
    for path in walk_files(sandbox.path()) {
        let Some(rel) = sandbox.relative(&path) else {
            continue;
        };
        if !matcher.is_match(&rel) {
            continue;
        }
        files.push(rel.to_string_lossy().replace('\\', "/"));
        if files.len() >= max {
            break;
        }
    }

    Ok(FileList {
        count: files.len(),
        truncated: files.len() >= max,
        files,
    })
}

/// Case-insensitive substring search across files matching `pattern`.
pub fn search(
    sandbox: &SandboxRoot,
    query: &str,
    pattern: &str,
    scan: &ScanConfig,
) -> ToolResult<SearchReport> {
    let total = directory_size(sandbox.path());
    if total > scan.max_dir_bytes() {
        return Err(ToolError::InvalidArgument(format!(
            "Directory exceeds {} GB ({total} bytes); narrow the sandbox before searching",
            scan.max_dir_size_gb
        )));
    }

    let matcher = compile_glob(pattern)?;
    let needle = query.to_lowercase();
    let max_files = scan.max_files_per_scan;
    let max_bytes = scan.max_file_bytes();

    let mut matches = Vec::new();
    let mut files_searched = 0;
    for path in walk_files(sandbox.path()) {
        if files_searched >= max_files {
            break;
        }
        let Some(rel) = sandbox.relative(&path) else {
            continue;
        };
        if !matcher.is_match(&rel) {
            continue;
        }
        let too_big = std::fs::metadata(&path).map_or(true, |m| m.len() > max_bytes);
        if too_big {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        files_searched += 1;
        if content.to_lowercase().contains(&needle) {
            matches.push(SearchMatch {
                filepath: rel.to_string_lossy().replace('\\', "/"),
            });
        }
    }

    Ok(SearchReport {
        query: query.to_string(),
        matches,
        files_searched,
        truncated: files_searched >= max_files,
    })
}

fn compile_glob(pattern: &str) -> ToolResult<GlobMatcher> {
    let pattern = if pattern.trim().is_empty() { "**/*" } else { pattern };
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| ToolError::InvalidArgument(format!("bad glob pattern '{pattern}': {e}")))
}

/// Regular files under `root` in a stable order, skipping hidden and ignored paths.
fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
}

fn directory_size(root: &Path) -> u64 {
    WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .build()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

/// `.gitignore` matchers from `root` down to `dir`, shallowest first. Each
/// is rooted at its own directory, as git scopes them.
fn load_gitignores(root: &Path, dir: &Path) -> Vec<Gitignore> {
    let mut dirs: Vec<&Path> = dir.ancestors().take_while(|d| d.starts_with(root)).collect();
    dirs.reverse();

    let mut matchers = Vec::new();
    for d in dirs {
        let file = d.join(".gitignore");
        if !file.is_file() {
            continue;
        }
        let (matcher, err) = Gitignore::new(&file);
        if let Some(e) = err {
            tracing::warn!(path = %file.display(), error = %e, "failed to parse .gitignore");
        }
        matchers.push(matcher);
    }
    matchers
}

/// The deepest matcher with an opinion decides, so nested files can
/// re-include what a parent ignores.
fn is_gitignored(matchers: &[Gitignore], path: &Path, is_dir: bool) -> bool {
    for matcher in matchers.iter().rev() {
        match matcher.matched_path_or_any_parents(path, is_dir) {
            Match::None => continue,
            m => return m.is_ignore(),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, SandboxRoot) {
        let tmp = TempDir::new().unwrap();
        let root = SandboxRoot::new(tmp.path()).unwrap();
        (tmp, root)
    }

    #[test]
    fn listing_hides_dotfiles_and_gitignored() {
        let (_tmp, root) = sandbox();
        let base = root.path();
        std::fs::write(base.join(".gitignore"), "*.log\ntarget/\n").unwrap();
        std::fs::write(base.join(".env"), "SECRET=1").unwrap();
        std::fs::write(base.join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(base.join("debug.log"), "noise").unwrap();
        std::fs::create_dir(base.join("src")).unwrap();
        std::fs::create_dir(base.join("target")).unwrap();

        let listing = list_directory(&root, base).unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["main.rs", "src"]);
        assert_eq!(listing.entries[1].entry_type, EntryType::Dir);
        assert_eq!(listing.path, ".");
    }

    #[test]
    fn listing_honors_nested_gitignores() {
        let (_tmp, root) = sandbox();
        let base = root.path();
        std::fs::write(base.join(".gitignore"), "*.log
").unwrap();
        std::fs::create_dir_all(base.join("app/out")).unwrap();
        std::fs::write(base.join("app/.gitignore"), "/out
!keep.log
").unwrap();
        std::fs::write(base.join("app/lib.rs"), "").unwrap();
        std::fs::write(base.join("app/run.log"), "").unwrap();
        std::fs::write(base.join("app/keep.log"), "").unwrap();

        let listing = list_directory(&root, &base.join("app")).unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["keep.log", "lib.rs"]);
        assert_eq!(listing.path, "app");
    }

    #[test]
    fn read_rejects_oversized_files() {
        let (_tmp, root) = sandbox();
        let path = root.path().join("big.txt");
        std::fs::write(&path, "x".repeat(2048)).unwrap();

        match read_text(&root, &path, 1024) {
            Err(ToolError::FileTooLarge { size, limit }) => {
                assert_eq!(size, 2048);
                assert_eq!(limit, 1024);
            }
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
        assert_eq!(read_text(&root, &path, 4096).unwrap().len(), 2048);
    }

    #[test]
    fn read_reports_missing_and_non_utf8() {
        let (_tmp, root) = sandbox();
        assert!(matches!(
            read_text(&root, &root.path().join("nope.txt"), 1024),
            Err(ToolError::NotFound(_))
        ));
        let bin = root.path().join("blob.bin");
        std::fs::write(&bin, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(read_text(&root, &bin, 1024), Err(ToolError::NotUtf8(_))));
        assert!(matches!(
            read_text(&root, root.path(), 1024),
            Err(ToolError::NotAFile(_))
        ));
    }

    #[test]
    fn write_backs_up_existing_content() {
        let (_tmp, root) = sandbox();
        let path = root.path().join("notes.txt");
        std::fs::write(&path, "old").unwrap();

        assert!(write_with_backup(&path, "new").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(root.path().join("notes.txt.bak")).unwrap(), "old");
    }

    #[test]
    fn write_creates_new_file_and_parents() {
        let (_tmp, root) = sandbox();
        let path = root.path().join("a/b/c.txt");
        assert!(!write_with_backup(&path, "hello").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn list_files_applies_glob_and_cap() {
        let (_tmp, root) = sandbox();
        std::fs::create_dir(root.path().join("src")).unwrap();
        for name in ["a.rs", "b.rs", "c.txt"] {
            std::fs::write(root.path().join("src").join(name), "x").unwrap();
        }
        let scan = ScanConfig {
            max_files_per_scan: 5,
            ..Default::default()
        };
        let list = list_files(&root, "**/*.rs", &scan).unwrap();
        assert_eq!(list.files, vec!["src/a.rs", "src/b.rs"]);
        assert!(!list.truncated);

        let capped = ScanConfig {
            max_files_per_scan: 1,
            ..Default::default()
        };
        let list = list_files(&root, "**/*", &capped).unwrap();
        assert_eq!(list.count, 1);
        assert!(list.truncated);
    }

    #[test]
    fn search_is_case_insensitive() {
        let (_tmp, root) = sandbox();
        std::fs::write(root.path().join("one.md"), "Hello World").unwrap();
        std::fs::write(root.path().join("two.md"), "nothing here").unwrap();

        let report = search(&root, "hello", "**/*.md", &ScanConfig::default()).unwrap();
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].filepath, "one.md");
        assert_eq!(report.files_searched, 2);
    }

    #[test]
    fn bad_glob_is_invalid_argument() {
        let (_tmp, root) = sandbox();
        assert!(matches!(
            list_files(&root, "[", &ScanConfig::default()),
            Err(ToolError::InvalidArgument(_))
        ));
    }
}
