use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use super::record::AssignmentRecord;
use crate::utils::write_json_atomic;

pub const LEDGER_FILE: &str = "agent_assignment.json";

/// Directory under the tasks root holding the main checkout; never a task.
const MAIN_CHECKOUT_DIR: &str = "main";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read ledger {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed ledger {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write ledger: {0}")]
    Write(#[from] anyhow::Error),
}

/// Older writers stored a single object instead of an array.
#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerDocument {
    Many(Vec<AssignmentRecord>),
    One(AssignmentRecord),
}

/// The effective active record of an agent, and the task directory holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub task_dir: PathBuf,
    pub record: AssignmentRecord,
}

/// Per-task assignment ledgers under `<tasks_root>/<task>/<metadata_dir>/`.
///
/// Records are appended; the effective record for an (agent, session) pair
/// within one file is the last one. Only placement stamping rewrites an
/// existing record.
#[derive(Debug, Clone)]
pub struct AssignmentLedger {
    tasks_root: PathBuf,
    metadata_dir: String,
}

impl AssignmentLedger {
    pub fn new(tasks_root: impl Into<PathBuf>, metadata_dir: impl Into<String>) -> Self {
        Self {
            tasks_root: tasks_root.into(),
            metadata_dir: metadata_dir.into(),
        }
    }

    #[cfg(test)]
    pub fn tasks_root(&self) -> &Path {
        &self.tasks_root
    }

    pub fn ledger_path(&self, task_dir: &Path) -> PathBuf {
        task_dir.join(&self.metadata_dir).join(LEDGER_FILE)
    }

    /// All records of a task, oldest first. A missing file is an empty ledger.
    pub async fn read(&self, task_dir: &Path) -> Result<Vec<AssignmentRecord>, LedgerError> {
        let path = self.ledger_path(task_dir);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(LedgerError::Io { path, source }),
        };

        match serde_json::from_str::<LedgerDocument>(&content) {
            Ok(LedgerDocument::Many(records)) => Ok(records),
            Ok(LedgerDocument::One(record)) => Ok(vec![record]),
            Err(source) => Err(LedgerError::Malformed { path, source }),
        }
    }

    async fn write(&self, task_dir: &Path, records: &[AssignmentRecord]) -> Result<(), LedgerError> {
        write_json_atomic(&self.ledger_path(task_dir), records).await?;
        Ok(())
    }

    pub async fn append(&self, task_dir: &Path, record: AssignmentRecord) -> Result<(), LedgerError> {
        let mut records = self.read(task_dir).await?;
        info!(
            agent_id = %record.agent_id,
            task = %record.task_name,
            session = %record.space_session,
            status = ?record.status,
            "appending assignment record"
        );
        records.push(record);
        self.write(task_dir, &records).await
    }

    /// Last record for the pair in this task's ledger, whatever its status.
    pub async fn effective_record(
        &self,
        task_dir: &Path,
        agent_id: &str,
        session: &str,
    ) -> Result<Option<AssignmentRecord>, LedgerError> {
        let records = self.read(task_dir).await?;
        Ok(effective_index(&records, agent_id, session).map(|i| records[i].clone()))
    }

    /// Appends a `released` record if the pair is currently active in this
    /// task. Returns whether anything was released.
    pub async fn release(
        &self,
        task_dir: &Path,
        agent_id: &str,
        session: &str,
    ) -> Result<bool, LedgerError> {
        let mut records = self.read(task_dir).await?;
        let Some(index) = effective_index(&records, agent_id, session) else {
            return Ok(false);
        };
        if !records[index].is_active() {
            return Ok(false);
        }

        let released = records[index].released();
        info!(agent_id, session, task = %released.task_name, "releasing assignment");
        records.push(released);
        self.write(task_dir, &records).await?;
        Ok(true)
    }

    /// Stamps window/pane onto the effective active record, in place.
    /// Returns `false` when there is no active record to stamp or the
    /// placement is already recorded.
    pub async fn record_placement(
        &self,
        task_dir: &Path,
        agent_id: &str,
        session: &str,
        window: u32,
        pane: u32,
    ) -> Result<bool, LedgerError> {
        let mut records = self.read(task_dir).await?;
        let Some(index) = effective_index(&records, agent_id, session) else {
            return Ok(false);
        };

        let record = &mut records[index];
        if !record.is_active() {
            return Ok(false);
        }
        if record.tmux_window == Some(window) && record.tmux_pane == Some(pane) {
            return Ok(false);
        }

        record.tmux_window = Some(window);
        record.tmux_pane = Some(pane);
        record.updated_at = Some(Utc::now());
        debug!(agent_id, session, window, pane, "recording pane placement");
        self.write(task_dir, &records).await?;
        Ok(true)
    }

    /// Task directories under the root, sorted by name, excluding the main
    /// checkout.
    pub async fn task_dirs(&self) -> Vec<PathBuf> {
        let mut entries = match fs::read_dir(&self.tasks_root).await {
            Ok(e) => e,
            Err(e) => {
                debug!(root = ?self.tasks_root, error = %e, "tasks root not readable");
                return Vec::new();
            }
        };

        let mut dirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if entry.file_name() == MAIN_CHECKOUT_DIR {
                continue;
            }
            dirs.push(path);
        }
        dirs.sort();
        dirs
    }

    /// Effective active claim of every agent in `session`.
    ///
    /// Unreadable or malformed ledgers are skipped with a warning. When one
    /// agent is active in more than one task, the most recent `assigned_at`
    /// wins and ties go to the task directory that sorts first.
    pub async fn active_claims(&self, session: &str) -> HashMap<String, Claim> {
        let mut contenders: HashMap<String, Vec<Claim>> = HashMap::new();

        for task_dir in self.task_dirs().await {
            let records = match self.read(&task_dir).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable assignment ledger");
                    continue;
                }
            };

            let mut last: HashMap<&str, usize> = HashMap::new();
            for (i, record) in records.iter().enumerate() {
                if record.space_session == session {
                    last.insert(record.agent_id.as_str(), i);
                }
            }

            let mut active: Vec<&AssignmentRecord> = last
                .values()
                .map(|&i| &records[i])
                .filter(|r| r.is_active())
                .collect();
            active.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

            for record in active {
                contenders
                    .entry(record.agent_id.clone())
                    .or_default()
                    .push(Claim {
                        task_dir: task_dir.clone(),
                        record: record.clone(),
                    });
            }
        }

        contenders
            .into_iter()
            .filter_map(|(agent_id, claims)| {
                if claims.len() > 1 {
                    let tasks: Vec<String> =
                        claims.iter().map(|c| c.record.task_name.clone()).collect();
                    warn!(agent_id = %agent_id, ?tasks, "ambiguous assignment, latest record wins");
                }
                let winner = pick_latest(claims)?;
                Some((agent_id, winner))
            })
            .collect()
    }

    pub async fn find_active(&self, agent_id: &str, session: &str) -> Option<Claim> {
        self.active_claims(session).await.remove(agent_id)
    }
}

fn effective_index(records: &[AssignmentRecord], agent_id: &str, session: &str) -> Option<usize> {
    records.iter().rposition(|r| r.matches(agent_id, session))
}

/// `claims` arrive in task directory order; a later claim only replaces the
/// current pick when strictly newer.
fn pick_latest(claims: Vec<Claim>) -> Option<Claim> {
    let mut best: Option<Claim> = None;
    for claim in claims {
        match &best {
            Some(current) if claim.record.assigned_at <= current.record.assigned_at => {}
            _ => best = Some(claim),
        }
    }
    best
}
