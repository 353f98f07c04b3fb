//! `.env` provisioning for task working copies. Declared env files are merged
//! in order into `<task_dir>/.env`, and the task's `.gitignore` is made to
//! exclude env files.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::utils::Glyph;

pub const ENV_FILE: &str = ".env";

const GITIGNORE_ENTRIES: [&str; 3] = [".env", ".env.local", ".env.*.local"];

/// Ordered `KEY=value` pairs. Setting an existing key replaces its value in
/// place, so a key keeps the position of its first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    entries: Vec<(String, String)>,
}

impl EnvVars {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads `KEY=value` lines. Blank lines, comments and lines without `=`
    /// are skipped; one level of matching quotes is removed.
    pub fn merge_str(&mut self, content: &str) {
        for (key, value) in content.lines().filter_map(parse_line) {
            self.set(key, value);
        }
    }

    /// One `KEY=value` line per entry. Values holding whitespace or `#` are
    /// double-quoted.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, render_value(value)))
            .collect()
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn render_value(value: &str) -> String {
    if value.chars().any(char::is_whitespace) || value.contains('#') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Merges `files` in order. Missing or unreadable files are skipped.
pub async fn merge_env_files(files: &[PathBuf]) -> EnvVars {
    let mut vars = EnvVars::default();
    for file in files {
        match fs::read_to_string(file).await {
            Ok(content) => {
                vars.merge_str(&content);
                debug!(file = ?file, keys = vars.len(), "merged env file");
            }
            Err(e) => {
                warn!(file = ?file, error = %e, status = %Glyph::Warn, "skipping env file");
            }
        }
    }
    vars
}

/// Writes the merge of `files` to `<dir>/.env` and updates `<dir>/.gitignore`.
/// An existing `.env` is never replaced. Returns whether `.env` was written.
pub async fn install_env_file(dir: &Path, files: &[PathBuf]) -> Result<bool> {
    if files.is_empty() {
        return Ok(false);
    }

    let vars = merge_env_files(files).await;
    if vars.is_empty() {
        debug!(dir = ?dir, "no env variables to install");
        return Ok(false);
    }

    let target = dir.join(ENV_FILE);
    if target.exists() {
        info!(path = ?target, "keeping existing env file");
        ensure_gitignore(dir).await?;
        return Ok(false);
    }

    fs::write(&target, vars.render())
        .await
        .with_context(|| format!("Failed to write {:?}", target))?;
    ensure_gitignore(dir).await?;
    info!(path = ?target, keys = vars.len(), status = %Glyph::Success, "installed env file");
    Ok(true)
}

/// Appends the env file patterns missing from `<dir>/.gitignore`.
async fn ensure_gitignore(dir: &Path) -> Result<()> {
    let path = dir.join(".gitignore");
    let existing = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };

    let present: HashSet<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !present.contains(entry))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut content = existing.clone();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in missing {
        content.push_str(entry);
        content.push('\n');
    }
    fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}
