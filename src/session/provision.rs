use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::envfile::install_env_file;
use super::git::{log_soft_failure, GitManager};
use crate::config::TaskConfig;
use crate::ledger::{AssignmentLedger, AssignmentRecord};
use crate::utils::Glyph;

/// Directory under the tasks root holding the main clone.
pub const MAIN_CHECKOUT: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub task_dir: PathBuf,
    pub worktree: bool,
    /// Whether a `.env` was written into the working copy.
    pub env_file: bool,
    /// Whether a new `active` record was appended.
    pub recorded: bool,
}

/// Establishes task working copies and owns the ledger write path for them.
#[derive(Debug, Clone)]
pub struct TaskProvisioner {
    tasks_root: PathBuf,
    session: String,
    git: GitManager,
    ledger: AssignmentLedger,
    env_files: Vec<PathBuf>,
}

impl TaskProvisioner {
    pub fn new(tasks_root: PathBuf, session: impl Into<String>, git: GitManager, ledger: AssignmentLedger) -> Self {
        Self {
            tasks_root,
            session: session.into(),
            git,
            ledger,
            env_files: Vec::new(),
        }
    }

    /// Space-wide env files, merged before each task's own.
    pub fn with_env_files(mut self, env_files: Vec<PathBuf>) -> Self {
        self.env_files = env_files;
        self
    }

    async fn install_env(&self, task: &TaskConfig, task_dir: &Path) -> bool {
        let files: Vec<PathBuf> = self
            .env_files
            .iter()
            .chain(&task.env_files)
            .cloned()
            .collect();
        match install_env_file(task_dir, &files).await {
            Ok(written) => written,
            Err(e) => {
                warn!(task = %task.name, error = %e, status = %Glyph::Warn, "failed to install env file");
                false
            }
        }
    }

    pub fn task_dir(&self, task: &TaskConfig) -> Result<PathBuf> {
        Ok(self.tasks_root.join(task.checked_directory_name()?))
    }

    pub fn main_checkout(&self) -> PathBuf {
        self.tasks_root.join(MAIN_CHECKOUT)
    }

    async fn ensure_working_copy(&self, task: &TaskConfig, task_dir: &Path) -> Result<bool> {
        if task_dir.exists() {
            return Ok(GitManager::is_repository(task_dir));
        }

        let main = self.main_checkout();
        if GitManager::is_repository(&main) {
            match self
                .git
                .add_worktree(&main, task_dir, &task.branch_name())
                .await
            {
                Ok(_) => {
                    info!(task = %task.name, dir = ?task_dir, status = %Glyph::Success, "created task worktree");
                    return Ok(true);
                }
                Err(e) => log_soft_failure("worktree add", &e),
            }
        }

        tokio::fs::create_dir_all(task_dir)
            .await
            .with_context(|| format!("Failed to create task directory {:?}", task_dir))?;
        info!(task = %task.name, dir = ?task_dir, "created plain task directory");
        Ok(false)
    }

    /// Ensures the task's working copy exists and that its assignee holds an
    /// active record for this session.
    pub async fn provision(&self, task: &TaskConfig) -> Result<ProvisionOutcome> {
        let task_dir = self.task_dir(task)?;
        let worktree = self.ensure_working_copy(task, &task_dir).await?;
        let env_file = self.install_env(task, &task_dir).await;

        let current = self
            .ledger
            .effective_record(&task_dir, &task.assignee, &self.session)
            .await?;

        let recorded = match current {
            Some(record) if record.is_active() => {
                info!(task = %task.name, agent_id = %task.assignee, "assignment already active");
                false
            }
            _ => {
                if let Some(other) = self.ledger.find_active(&task.assignee, &self.session).await {
                    if other.task_dir != task_dir {
                        warn!(
                            agent_id = %task.assignee,
                            previous = %other.record.task_name,
                            task = %task.name,
                            "assignee already active on another task, the newer assignment wins"
                        );
                    }
                }
                let mut record =
                    AssignmentRecord::active(&task.assignee, &task.name, &self.session)
                        .with_branch(task.branch_name());
                if let Some(description) = &task.description {
                    record = record.with_description(description);
                }
                self.ledger.append(&task_dir, record).await?;
                true
            }
        };

        Ok(ProvisionOutcome {
            task_dir,
            worktree,
            env_file,
            recorded,
        })
    }

    /// Marks the task's assignment released. The working copy is kept.
    pub async fn release(&self, task: &TaskConfig) -> Result<bool> {
        let task_dir = self.task_dir(task)?;
        let released = self
            .ledger
            .release(&task_dir, &task.assignee, &self.session)
            .await?;
        if !released {
            warn!(task = %task.name, agent_id = %task.assignee, "no active assignment to release");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn provisioner(root: &Path) -> TaskProvisioner {
        let tasks_root = root.join("tasks");
        TaskProvisioner::new(
            tasks_root.clone(),
            "space",
            GitManager::new(Duration::from_secs(30), Duration::from_secs(30)),
            AssignmentLedger::new(tasks_root, ".metadata"),
        )
    }

    #[tokio::test]
    async fn provision_without_repository_creates_directory_and_record() {
        let tmp = TempDir::new().unwrap();
        let prov = provisioner(tmp.path());
        let mut task = TaskConfig::new("Login Form", "org02-wk-a-r1");
        task.description = Some("build it".to_string());

        let outcome = prov.provision(&task).await.unwrap();

        assert_eq!(outcome.task_dir, tmp.path().join("tasks").join("login-form"));
        assert!(outcome.task_dir.is_dir());
        assert!(!outcome.worktree);
        assert!(outcome.recorded);

        let ledger = AssignmentLedger::new(tmp.path().join("tasks"), ".metadata");
        let records = ledger.read(&outcome.task_dir).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].branch.as_deref(), Some("login-form"));
        assert_eq!(records[0].description.as_deref(), Some("build it"));
    }

    #[tokio::test]
    async fn provision_is_idempotent_while_active() {
        let tmp = TempDir::new().unwrap();
        let prov = provisioner(tmp.path());
        let task = TaskConfig::new("api", "org01-pm-r1");

        assert!(prov.provision(&task).await.unwrap().recorded);
        assert!(
            !prov.provision(&task).await.unwrap().recorded,
            "provision: an active assignment is not duplicated"
        );
    }

    #[tokio::test]
    async fn release_then_provision_reactivates() {
        let tmp = TempDir::new().unwrap();
        let prov = provisioner(tmp.path());
        let task = TaskConfig::new("api", "org01-pm-r1");

        prov.provision(&task).await.unwrap();
        assert!(prov.release(&task).await.unwrap());
        assert!(!prov.release(&task).await.unwrap());
        assert!(prov.provision(&task).await.unwrap().recorded);
    }

    #[tokio::test]
    async fn task_resolving_to_main_checkout_is_refused() {
        let tmp = TempDir::new().unwrap();
        let prov = provisioner(tmp.path());
        let task = TaskConfig::new("main", "org01-pm-r1");

        assert!(prov.provision(&task).await.is_err());
        assert!(
            !tmp.path().join("tasks").join("main").join(".metadata").exists(),
            "provision: nothing is recorded inside the main checkout"
        );
    }

    #[tokio::test]
    async fn non_ascii_tasks_get_separate_directories() {
        let tmp = TempDir::new().unwrap();
        let prov = provisioner(tmp.path());

        let login = prov
            .provision(&TaskConfig::new("ログイン機能", "org01-pm-r1"))
            .await
            .unwrap();
        let billing = prov
            .provision(&TaskConfig::new("決済機能", "org02-pm-r1"))
            .await
            .unwrap();

        assert_ne!(login.task_dir, billing.task_dir);
        let ledger = AssignmentLedger::new(tmp.path().join("tasks"), ".metadata");
        assert_eq!(
            ledger.find_active("org01-pm-r1", "space").await.map(|c| c.task_dir),
            Some(login.task_dir)
        );
    }

    #[tokio::test]
    async fn worktree_timeout_falls_back_to_plain_directory() {
        let tmp = TempDir::new().unwrap();
        let tasks_root = tmp.path().join("tasks");
        let main = tasks_root.join(MAIN_CHECKOUT);
        std::fs::create_dir_all(&main).unwrap();
        for args in [
            vec!["init", "-q"],
            vec!["-c", "user.name=t", "-c", "user.email=t@t", "commit", "--allow-empty", "-q", "-m", "init"],
        ] {
            std::process::Command::new("git")
                .args(&args)
                .current_dir(&main)
                .output()
                .unwrap();
        }
        let prov = TaskProvisioner::new(
            tasks_root.clone(),
            "space",
            GitManager::new(Duration::from_secs(30), Duration::from_millis(1)),
            AssignmentLedger::new(tasks_root.clone(), ".metadata"),
        );

        let outcome = prov
            .provision(&TaskConfig::new("api", "org01-pm-r1"))
            .await
            .unwrap();

        assert!(!outcome.worktree, "provision: timed out worktree is not reported as created");
        assert!(outcome.recorded, "provision: the assignment is recorded regardless");
        assert!(outcome.task_dir.is_dir());
    }

    #[tokio::test]
    async fn task_env_files_override_space_env_files() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join(".env.shared");
        std::fs::write(&shared, "API_KEY=shared\nLOG_LEVEL=INFO\n").unwrap();
        let own = tmp.path().join(".env.api");
        std::fs::write(&own, "API_KEY=api\n").unwrap();

        let prov = provisioner(tmp.path()).with_env_files(vec![shared]);
        let mut task = TaskConfig::new("api", "org01-pm-r1");
        task.env_files = vec![own];

        let outcome = prov.provision(&task).await.unwrap();

        assert!(outcome.env_file);
        assert_eq!(
            std::fs::read_to_string(outcome.task_dir.join(".env")).unwrap(),
            "API_KEY=api\nLOG_LEVEL=INFO\n"
        );
        assert!(
            !prov.provision(&task).await.unwrap().env_file,
            "provision: an existing .env is left alone"
        );
    }
}
