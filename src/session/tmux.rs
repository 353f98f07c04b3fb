//! tmux driver. Windows and panes are addressed from index 0: the initial
//! window of a new session is moved to 0 and every window pins
//! `pane-base-index` to 0, whatever the user's tmux configuration says.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::layout::{SplitDirection, SplitPlan, SplitStep};
use crate::utils::{shell_single_quote, Glyph};

#[derive(Debug, Error)]
pub enum TmuxError {
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
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub index: u32,
    pub current_path: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub index: u32,
    pub name: String,
    pub panes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub name: String,
    /// Space name the session was tagged with at creation.
    pub space: String,
    pub base_path: Option<PathBuf>,
    pub windows: Vec<WindowInfo>,
}

impl SessionSummary {
    pub fn pane_count(&self) -> u32 {
        self.windows.iter().map(|w| w.panes).sum()
    }
}

pub fn window_target(session: &str, window: u32) -> String {
    format!("{session}:{window}")
}

pub fn pane_target(session: &str, window: u32, pane: u32) -> String {
    format!("{session}:{window}.{pane}")
}

/// Terminal multiplexer primitives. Every call is fallible and returns the
/// multiplexer's diagnostic text on failure; nothing here retries.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn has_session(&self, session: &str) -> bool;

    async fn new_session(&self, session: &str, working_dir: &Path) -> Result<(), TmuxError>;

    async fn kill_session(&self, session: &str) -> Result<(), TmuxError>;

    async fn set_option(&self, session: &str, option: &str, value: &str) -> Result<(), TmuxError>;

    async fn set_window_option(
        &self,
        session: &str,
        window: u32,
        option: &str,
        value: &str,
    ) -> Result<(), TmuxError>;

    async fn move_window(&self, session: &str, from: u32, to: u32) -> Result<(), TmuxError>;

    async fn set_env(&self, session: &str, key: &str, value: &str) -> Result<(), TmuxError>;

    /// `None` when the variable is not set in the session.
    async fn get_env(&self, session: &str, key: &str) -> Result<Option<String>, TmuxError>;

    async fn new_window(
        &self,
        session: &str,
        window: u32,
        name: &str,
        working_dir: &Path,
    ) -> Result<(), TmuxError>;

    async fn rename_window(&self, session: &str, window: u32, name: &str) -> Result<(), TmuxError>;

    async fn kill_window(&self, session: &str, window: u32) -> Result<(), TmuxError>;

    async fn select_window(&self, session: &str, window: u32) -> Result<(), TmuxError>;

    async fn split_pane(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        direction: SplitDirection,
        working_dir: &Path,
    ) -> Result<(), TmuxError>;

    async fn select_layout(&self, session: &str, window: u32, layout: &str) -> Result<(), TmuxError>;

    /// Types `line` into the pane and presses Enter.
    async fn send_line(&self, session: &str, window: u32, pane: u32, line: &str) -> Result<(), TmuxError>;

    async fn set_pane_title(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        title: &str,
    ) -> Result<(), TmuxError>;

    async fn list_sessions(&self) -> Result<Vec<String>, TmuxError>;

    async fn list_windows(&self, session: &str) -> Result<Vec<WindowInfo>, TmuxError>;

    async fn list_panes(&self, session: &str, window: u32) -> Result<Vec<PaneInfo>, TmuxError>;

    async fn capture_pane(&self, session: &str, window: u32, pane: u32) -> Result<String, TmuxError>;
}

/// Kills `session` if it exists. Returns whether a session was removed.
pub async fn cleanup_existing_session<M: Multiplexer + ?Sized>(
    mux: &M,
    session: &str,
) -> Result<bool, TmuxError> {
    if !mux.has_session(session).await {
        debug!(session, "no existing session to clean up");
        return Ok(false);
    }
    mux.kill_session(session).await?;
    info!(session, status = %Glyph::Success, "killed existing session");
    Ok(true)
}

/// Puts the only window of a fresh session at index 0 and pins its pane
/// numbering to 0.
pub async fn normalize_base_indices<M: Multiplexer + ?Sized>(
    mux: &M,
    session: &str,
) -> Result<(), TmuxError> {
    let windows = mux.list_windows(session).await?;
    if let Some(first) = windows.first() {
        if first.index != 0 {
            mux.move_window(session, first.index, 0).await?;
            debug!(session, from = first.index, "moved initial window to index 0");
        }
    }
    pin_pane_base_index(mux, session, 0).await
}

pub async fn pin_pane_base_index<M: Multiplexer + ?Sized>(
    mux: &M,
    session: &str,
    window: u32,
) -> Result<(), TmuxError> {
    mux.set_window_option(session, window, "pane-base-index", "0")
        .await
}

/// Moves a pane's shell to `dir` by typing a `cd`. Takes effect
/// asynchronously; only the pane's reported current path confirms it.
pub async fn set_pane_cwd<M: Multiplexer + ?Sized>(
    mux: &M,
    session: &str,
    window: u32,
    pane: u32,
    dir: &Path,
) -> Result<(), TmuxError> {
    let line = format!("cd {}", shell_single_quote(&dir.to_string_lossy()));
    mux.send_line(session, window, pane, &line).await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitReport {
    Complete {
        panes: u32,
    },
    /// The window was left with a different pane count than planned.
    Partial {
        expected: u32,
        actual: u32,
        failures: Vec<String>,
    },
}

impl SplitReport {
    pub fn is_complete(&self) -> bool {
        matches!(self, SplitReport::Complete { .. })
    }

    /// Panes that actually exist in the window.
    pub fn pane_count(&self) -> u32 {
        match self {
            SplitReport::Complete { panes } => *panes,
            SplitReport::Partial { actual, .. } => *actual,
        }
    }
}

/// Runs a split plan against a single-pane window, then checks the resulting
/// pane count. A failed step is recorded and the sequence continues; nothing
/// is retried since a retry would split twice.
pub async fn split_window<M: Multiplexer + ?Sized>(
    mux: &M,
    session: &str,
    window: u32,
    plan: SplitPlan,
    working_dir: &Path,
) -> SplitReport {
    let mut failures = Vec::new();

    for step in plan.steps() {
        let result = match step {
            SplitStep::Split { target, direction } => {
                mux.split_pane(session, window, target, direction, working_dir)
                    .await
            }
            SplitStep::Tile => mux.select_layout(session, window, "tiled").await,
        };
        if let Err(e) = result {
            warn!(session, window, ?step, error = %e, status = %Glyph::Warn, "split step failed");
            failures.push(e.to_string());
        }
    }

    let expected = plan.expected_panes();
    let actual = match mux.list_panes(session, window).await {
        Ok(panes) => panes.len() as u32,
        Err(e) => {
            failures.push(e.to_string());
            0
        }
    };

    if actual == expected && failures.is_empty() {
        info!(session, window, panes = actual, layout = %plan.label(), status = %Glyph::Success, "window split");
        SplitReport::Complete { panes: actual }
    } else {
        warn!(
            session,
            window,
            expected,
            actual,
            failures = failures.len(),
            status = %Glyph::Error,
            "window left partially split"
        );
        SplitReport::Partial {
            expected,
            actual,
            failures,
        }
    }
}

/// The `tmux` binary.
#[derive(Debug, Clone)]
pub struct TmuxManager {
    program: String,
    command_timeout: Duration,
}

impl TmuxManager {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            program: "tmux".to_string(),
            command_timeout,
        }
    }

    #[cfg(test)]
    fn with_program(program: &str, command_timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            command_timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command, "running");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(TmuxError::Spawn { command, source }),
            Err(_) => {
                return Err(TmuxError::Timeout {
                    command,
                    limit: self.command_timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(TmuxError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Attaches the current terminal. Runs without a timeout since it lasts
    /// until the user detaches.
    pub async fn attach(&self, session: &str) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .args(["attach-session", "-t", session])
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("{} attach-session -t {} exited with {}", self.program, session, status);
        }
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `show-environment` prints `KEY=value`, or `-KEY` for a removed variable.
fn parse_env_value(stdout: &str, key: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
        .map(|value| value.trim().to_string())
}

fn parse_panes(stdout: &str) -> Vec<PaneInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let index = fields.next()?.trim().parse().ok()?;
            Some(PaneInfo {
                index,
                current_path: fields.next().unwrap_or_default().to_string(),
                title: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn parse_windows(stdout: &str) -> Vec<WindowInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let index = fields.next()?.trim().parse().ok()?;
            let panes = fields.next()?.trim().parse().ok()?;
            Some(WindowInfo {
                index,
                panes,
                name: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Multiplexer for TmuxManager {
    async fn has_session(&self, session: &str) -> bool {
        self.run(&["has-session", "-t", session]).await.is_ok()
    }

    async fn new_session(&self, session: &str, working_dir: &Path) -> Result<(), TmuxError> {
        let dir = path_arg(working_dir);
        self.run(&["new-session", "-d", "-s", session, "-c", &dir])
            .await?;
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> Result<(), TmuxError> {
        self.run(&["kill-session", "-t", session]).await?;
        Ok(())
    }

    async fn set_option(&self, session: &str, option: &str, value: &str) -> Result<(), TmuxError> {
        self.run(&["set-option", "-t", session, option, value]).await?;
        Ok(())
    }

    async fn set_window_option(
        &self,
        session: &str,
        window: u32,
        option: &str,
        value: &str,
    ) -> Result<(), TmuxError> {
        let target = window_target(session, window);
        self.run(&["set-window-option", "-t", &target, option, value])
            .await?;
        Ok(())
    }

    async fn move_window(&self, session: &str, from: u32, to: u32) -> Result<(), TmuxError> {
        let source = window_target(session, from);
        let target = window_target(session, to);
        self.run(&["move-window", "-s", &source, "-t", &target]).await?;
        Ok(())
    }

    async fn set_env(&self, session: &str, key: &str, value: &str) -> Result<(), TmuxError> {
        self.run(&["set-environment", "-t", session, key, value]).await?;
        Ok(())
    }

    async fn get_env(&self, session: &str, key: &str) -> Result<Option<String>, TmuxError> {
        match self.run(&["show-environment", "-t", session, key]).await {
            Ok(stdout) => Ok(parse_env_value(&stdout, key)),
            // Unknown variables are reported as a failure.
            Err(TmuxError::CommandFailed { stderr, .. }) => {
                debug!(session, key, stderr = %stderr, "environment variable not set");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn new_window(
        &self,
        session: &str,
        window: u32,
        name: &str,
        working_dir: &Path,
    ) -> Result<(), TmuxError> {
        let target = window_target(session, window);
        let dir = path_arg(working_dir);
        self.run(&["new-window", "-d", "-t", &target, "-n", name, "-c", &dir])
            .await?;
        Ok(())
    }

    async fn rename_window(&self, session: &str, window: u32, name: &str) -> Result<(), TmuxError> {
        let target = window_target(session, window);
        self.run(&["rename-window", "-t", &target, name]).await?;
        Ok(())
    }

    async fn kill_window(&self, session: &str, window: u32) -> Result<(), TmuxError> {
        let target = window_target(session, window);
        self.run(&["kill-window", "-t", &target]).await?;
        Ok(())
    }

    async fn select_window(&self, session: &str, window: u32) -> Result<(), TmuxError> {
        let target = window_target(session, window);
        self.run(&["select-window", "-t", &target]).await?;
        Ok(())
    }

    async fn split_pane(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        direction: SplitDirection,
        working_dir: &Path,
    ) -> Result<(), TmuxError> {
        let target = pane_target(session, window, pane);
        let dir = path_arg(working_dir);
        self.run(&["split-window", direction.flag(), "-t", &target, "-c", &dir])
            .await?;
        Ok(())
    }

    async fn select_layout(&self, session: &str, window: u32, layout: &str) -> Result<(), TmuxError> {
        let target = window_target(session, window);
        self.run(&["select-layout", "-t", &target, layout]).await?;
        Ok(())
    }

    async fn send_line(&self, session: &str, window: u32, pane: u32, line: &str) -> Result<(), TmuxError> {
        let target = pane_target(session, window, pane);
        self.run(&["send-keys", "-t", &target, line, "Enter"]).await?;
        Ok(())
    }

    async fn set_pane_title(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        title: &str,
    ) -> Result<(), TmuxError> {
        let target = pane_target(session, window, pane);
        self.run(&["select-pane", "-t", &target, "-T", title]).await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, TmuxError> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(stdout) => Ok(stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            // No server running means no sessions.
            Err(TmuxError::CommandFailed { stderr, .. }) => {
                debug!(stderr = %stderr, "list-sessions failed, assuming no server");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_windows(&self, session: &str) -> Result<Vec<WindowInfo>, TmuxError> {
        let stdout = self
            .run(&[
                "list-windows",
                "-t",
                session,
                "-F",
                "#{window_index}\t#{window_panes}\t#{window_name}",
            ])
            .await?;
        Ok(parse_windows(&stdout))
    }

    async fn list_panes(&self, session: &str, window: u32) -> Result<Vec<PaneInfo>, TmuxError> {
        let target = window_target(session, window);
        let stdout = self
            .run(&[
                "list-panes",
                "-t",
                &target,
                "-F",
                "#{pane_index}\t#{pane_current_path}\t#{pane_title}",
            ])
            .await?;
        Ok(parse_panes(&stdout))
    }

    async fn capture_pane(&self, session: &str, window: u32, pane: u32) -> Result<String, TmuxError> {
        let target = pane_target(session, window, pane);
        self.run(&["capture-pane", "-p", "-t", &target]).await
    }
}
