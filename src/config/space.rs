use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::{default_rooms, Organization, RoomConfig};
use crate::utils::sanitize_branch_name;

/// Names under the tasks root that can never hold a task: the main checkout
/// and the path segments that escape the root.
const RESERVED_DIRECTORY_NAMES: [&str; 3] = ["main", ".", ".."];

/// Grid when none is declared.
const DEFAULT_GRID: &str = "8x4";
/// Grid when none is declared and the space has three rooms: 8 + 8 + 4 panes.
const THREE_ROOM_GRID: &str = "5x4";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitRepoConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Agent id of the desk that works on this task.
    pub assignee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Merged after the space's env files, so task values win.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_files: Vec<PathBuf>,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assignee: assignee.into(),
            branch: None,
            description: None,
            env_files: Vec::new(),
        }
    }

    pub fn branch_name(&self) -> String {
        match &self.branch {
            Some(branch) if !branch.trim().is_empty() => branch.trim().to_string(),
            _ => sanitize_branch_name(&self.name),
        }
    }

    /// Directory name under the tasks root. Slashes in branch names would
    /// nest directories, so they are flattened.
    pub fn directory_name(&self) -> String {
        self.branch_name().replace('/', "-")
    }

    /// `directory_name`, refusing names that would land on the main checkout
    /// or outside the tasks root.
    pub fn checked_directory_name(&self) -> Result<String> {
        let dir = self.directory_name();
        if RESERVED_DIRECTORY_NAMES
            .iter()
            .any(|reserved| dir.eq_ignore_ascii_case(reserved))
        {
            bail!(
                "Task '{}' resolves to reserved directory '{}'; declare another branch",
                self.name,
                dir
            );
        }
        Ok(dir)
    }
}

/// The typed space document: organizations, rooms, grid and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<GitRepoConfig>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    /// `.env` sources merged in order into every task working copy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_files: Vec<PathBuf>,
}

impl SpaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grid: None,
            base_path: None,
            organizations: Vec::new(),
            rooms: Vec::new(),
            git_repo: None,
            tasks: Vec::new(),
            env_files: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read space file: {:?}", path))?;
        let space: SpaceConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse space file: {:?}", path))?;
        space
            .validate()
            .with_context(|| format!("Invalid space file: {:?}", path))?;
        Ok(space)
    }

    /// Checks the name and that every task owns a distinct directory.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Space has an empty name");
        }
        let mut owners: HashMap<String, &str> = HashMap::new();
        for task in &self.tasks {
            let dir = task.checked_directory_name()?;
            if let Some(previous) = owners.insert(dir.to_lowercase(), &task.name) {
                bail!(
                    "Tasks '{}' and '{}' both resolve to directory '{}'",
                    previous,
                    task.name,
                    dir
                );
            }
        }
        Ok(())
    }

    /// tmux session name; `.` and `:` are target separators in tmux.
    pub fn session_name(&self) -> String {
        self.name
            .trim()
            .chars()
            .map(|c| if c == '.' || c == ':' || c.is_whitespace() { '-' } else { c })
            .collect()
    }

    /// Absolute base path of the space, `./<name>` when not declared.
    pub fn resolved_base_path(&self) -> Result<PathBuf> {
        let declared = self
            .base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.session_name()));
        if declared.is_absolute() {
            return Ok(declared);
        }
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(cwd.join(declared))
    }

    /// Declared rooms, or the three canonical rooms when none are declared.
    pub fn effective_rooms(&self) -> Vec<RoomConfig> {
        if self.rooms.is_empty() {
            warn!(space = %self.name, "no rooms declared, using default rooms");
            return default_rooms();
        }
        self.rooms.clone()
    }

    /// Declared grid, or the default matching the effective room count.
    pub fn effective_grid(&self) -> String {
        if let Some(grid) = &self.grid {
            return grid.clone();
        }
        let room_count = if self.rooms.is_empty() {
            default_rooms().len()
        } else {
            self.rooms.len()
        };
        let grid = if room_count == 3 {
            THREE_ROOM_GRID
        } else {
            DEFAULT_GRID
        };
        grid.to_string()
    }

    pub fn find_task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
