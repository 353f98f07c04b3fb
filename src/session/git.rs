use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::utils::Glyph;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {limit:?}")]
    Timeout { command: String, limit: Duration },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{path:?} exists, is not empty and is not a git repository")]
    DestinationOccupied { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    AlreadyPresent,
}

/// Runs `git` with an explicit working directory and a timeout per call.
#[derive(Debug, Clone)]
pub struct GitManager {
    clone_timeout: Duration,
    worktree_timeout: Duration,
}

impl GitManager {
    pub fn new(clone_timeout: Duration, worktree_timeout: Duration) -> Self {
        Self {
            clone_timeout,
            worktree_timeout,
        }
    }

    async fn run(&self, args: &[&str], cwd: &Path, limit: Duration) -> Result<String, GitError> {
        let command = format!("git {}", args.join(" "));
        debug!(command = %command, cwd = ?cwd, "running");

        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(GitError::Spawn { command, source }),
            Err(_) => return Err(GitError::Timeout { command, limit }),
        };

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn is_repository(path: &Path) -> bool {
        path.join(".git").exists()
    }

    /// Clones `url` into `dest`. An existing repository at `dest` is left
    /// alone; a non-empty directory that is not one is never overwritten.
    pub async fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        branch: Option<&str>,
    ) -> Result<CloneOutcome, GitError> {
        if Self::is_repository(dest) {
            info!(dest = ?dest, "repository already cloned");
            return Ok(CloneOutcome::AlreadyPresent);
        }

        if dir_has_entries(dest).await {
            return Err(GitError::DestinationOccupied {
                path: dest.to_path_buf(),
            });
        }

        let parent = dest.parent().unwrap_or(Path::new("."));
        if let Err(source) = tokio::fs::create_dir_all(parent).await {
            return Err(GitError::Spawn {
                command: format!("mkdir -p {}", parent.display()),
                source,
            });
        }

        // Cloned relative to the parent, which is also the working directory.
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| dest.to_string_lossy());
        let mut args = vec!["clone"];
        if let Some(branch) = branch {
            args.extend(["--branch", branch]);
        }
        args.extend([url, name.as_ref()]);

        self.run(&args, parent, self.clone_timeout).await?;
        info!(url, dest = ?dest, status = %Glyph::Success, "cloned repository");
        Ok(CloneOutcome::Cloned)
    }

    /// Adds a worktree at `path` for `branch`, checking out an existing
    /// branch first and creating it when that fails.
    pub async fn add_worktree(&self, repo: &Path, path: &Path, branch: &str) -> Result<PathBuf, GitError> {
        let path_str = path.to_string_lossy();

        match self
            .run(
                &["worktree", "add", path_str.as_ref(), branch],
                repo,
                self.worktree_timeout,
            )
            .await
        {
            Ok(_) => return Ok(path.to_path_buf()),
            Err(GitError::CommandFailed { stderr, .. }) => {
                debug!(branch, stderr = %stderr, "branch not checked out, creating it");
            }
            Err(e) => return Err(e),
        }

        self.run(
            &["worktree", "add", path_str.as_ref(), "-b", branch],
            repo,
            self.worktree_timeout,
        )
        .await?;
        Ok(path.to_path_buf())
    }

    #[cfg(test)]
    pub async fn current_branch(&self, repo: &Path) -> Result<String, GitError> {
        self.run(
            &["rev-parse", "--abbrev-ref", "HEAD"],
            repo,
            self.worktree_timeout,
        )
        .await
    }
}

async fn dir_has_entries(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// Logs a git failure as a soft failure; callers carry on without git.
pub fn log_soft_failure(operation: &str, error: &GitError) {
    warn!(operation, error = %error, status = %Glyph::Warn, "git step failed, continuing without it");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> GitManager {
        GitManager::new(Duration::from_secs(30), Duration::from_secs(30))
    }

    fn git(args: &[&str], cwd: &Path) {
        std::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .unwrap();
    }

    fn init_repo(path: &Path) {
        std::fs::create_dir_all(path).unwrap();
        git(&["init", "-q"], path);
        git(&["-c", "user.name=t", "-c", "user.email=t@t", "commit", "--allow-empty", "-q", "-m", "init"], path);
    }

    #[tokio::test]
    async fn clone_skips_existing_repository() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("main");
        std::fs::create_dir_all(dest.join(".git")).unwrap();

        let outcome = manager()
            .clone_repository("https://invalid.example/repo.git", &dest, None)
            .await
            .unwrap();
        assert_eq!(outcome, CloneOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn clone_refuses_occupied_directory() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("main");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("notes.txt"), "keep me").unwrap();

        let err = manager()
            .clone_repository("https://invalid.example/repo.git", &dest, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::DestinationOccupied { .. }));
        assert!(dest.join("notes.txt").exists(), "clone_repository: existing files untouched");
    }

    #[tokio::test]
    async fn clone_of_local_repository() {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        init_repo(&origin);
        let dest = tmp.path().join("tasks").join("main");

        let outcome = manager()
            .clone_repository(&origin.to_string_lossy(), &dest, None)
            .await
            .unwrap();
        assert_eq!(outcome, CloneOutcome::Cloned);
        assert!(GitManager::is_repository(&dest));
    }

    #[tokio::test]
    async fn add_worktree_creates_missing_branch() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("main");
        init_repo(&repo);
        let wt = tmp.path().join("feature-x");

        let path = manager().add_worktree(&repo, &wt, "feature-x").await.unwrap();
        assert_eq!(path, wt);
        assert!(wt.join(".git").exists(), "add_worktree: worktree checked out");
        assert_eq!(manager().current_branch(&wt).await.unwrap(), "feature-x");
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let tmp = TempDir::new().unwrap();
        let err = manager()
            .add_worktree(tmp.path(), &tmp.path().join("wt"), "b")
            .await
            .unwrap_err();
        match err {
            GitError::CommandFailed { command, stderr } => {
                assert!(command.starts_with("git worktree add"));
                assert!(!stderr.is_empty());
            }
            other => panic!("add_worktree: expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clone_past_its_limit_times_out() {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        init_repo(&origin);
        let dest = tmp.path().join("tasks").join("main");

        let err = GitManager::new(Duration::from_millis(1), Duration::from_secs(30))
            .clone_repository(&origin.to_string_lossy(), &dest, None)
            .await
            .unwrap_err();
        match err {
            GitError::Timeout { command, limit } => {
                assert!(command.starts_with("git clone"));
                assert_eq!(limit, Duration::from_millis(1));
            }
            other => panic!("clone_repository: expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn timeout_message_keeps_sub_second_limits() {
        let err = GitError::Timeout {
            command: "git clone".to_string(),
            limit: Duration::from_millis(1),
        };
        assert_eq!(err.to_string(), "`git clone` timed out after 1ms");
    }
}
