//! Git subprocess helpers.
//!
//! Every operation first checks that the sandbox is a repository and that a
//! `git` binary is on `PATH`, so callers get a specific message instead of a
//! raw spawn failure.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{ToolError, ToolResult};

/// Default number of commits shown by [`log`].
pub const DEFAULT_LOG_LIMIT: usize = 10;

/// Output of one git invocation.
#[derive(Debug)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitOutput {
    fn into_stdout(self, what: &str) -> ToolResult<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(ToolError::Git(format!(
                "git {what} failed (exit {}): {}",
                self.exit_code,
                self.stderr.trim()
            )))
        }
    }
}

/// Run git in `cwd` with prompts disabled.
pub async fn run(cwd: &Path, args: &[&str]) -> ToolResult<GitOutput> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GCM_INTERACTIVE", "never")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ToolError::Git(format!("Failed to execute git: {e}")))?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Pre-flight: the root holds a `.git` directory and git runs.
pub async fn ensure_repo(root: &Path) -> ToolResult<()> {
    if !root.join(".git").exists() {
        return Err(ToolError::Git(
            "Not a git repository (no .git directory in watch directory)".into(),
        ));
    }
    let version = Command::new("git")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match version {
        Ok(status) if status.success() => Ok(()),
        _ => Err(ToolError::Git(
            "git is not installed or not on PATH".into(),
        )),
    }
}

/// `git diff [-- files...]`. Empty output becomes a readable message.
pub async fn diff(root: &Path, files: &[String]) -> ToolResult<String> {
    ensure_repo(root).await?;
    let mut args = vec!["diff"];
    if !files.is_empty() {
        args.push("--");
        args.extend(files.iter().map(String::as_str));
    }
    let out = run(root, &args).await?.into_stdout("diff")?;
    if out.trim().is_empty() {
        Ok("No changes".into())
    } else {
        Ok(out)
    }
}

/// Stage everything and commit.
pub async fn commit(root: &Path, message: &str) -> ToolResult<String> {
    if message.trim().is_empty() {
        return Err(ToolError::InvalidArgument("commit message must not be empty".into()));
    }
    ensure_repo(root).await?;
    run(root, &["add", "."]).await?.into_stdout("add")?;

    let out = run(root, &["commit", "-m", message]).await?;
    if !out.success {
        let combined = format!("{}{}", out.stdout, out.stderr);
        if combined.contains("nothing to commit") || combined.contains("no changes added") {
            return Err(ToolError::Git("Nothing to commit, working tree clean".into()));
        }
        if combined.contains("Please tell me who you are") {
            return Err(ToolError::Git(
                "git user.name and user.email are not configured".into(),
            ));
        }
    }
    out.into_stdout("commit")
}

/// `git log --oneline -n <limit>`.
pub async fn log(root: &Path, limit: usize) -> ToolResult<String> {
    ensure_repo(root).await?;
    let limit = limit.max(1).to_string();
    let out = run(root, &["log", "--oneline", "-n", &limit]).await?;
    if !out.success && out.stderr.contains("does not have any commits") {
        return Ok("No commits yet".into());
    }
    out.into_stdout("log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn non_repository_is_reported_before_spawning() {
        let tmp = TempDir::new().unwrap();
        let err = diff(tmp.path(), &[]).await.unwrap_err();
        assert!(err.to_string().contains("Not a git repository"));

        let err = log(tmp.path(), 5).await.unwrap_err();
        assert!(matches!(err, ToolError::Git(_)));
    }

    #[tokio::test]
    async fn empty_commit_message_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            commit(tmp.path(), "  ").await,
            Err(ToolError::InvalidArgument(_))
        ));
    }
}
