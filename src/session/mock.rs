//! In-memory multiplexer for tests. Tracks sessions, windows and panes the
//! way tmux numbers them and records every command it is asked to run.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::tmux::{pane_target, window_target, Multiplexer, PaneInfo, TmuxError, WindowInfo};
use crate::layout::SplitDirection;

#[derive(Debug, Clone, Default)]
struct FakePane {
    path: String,
    title: String,
}

#[derive(Debug, Clone, Default)]
struct FakeWindow {
    name: String,
    panes: Vec<FakePane>,
}

#[derive(Debug, Clone)]
struct Recorded {
    line: String,
    write: bool,
}

#[derive(Debug, Default)]
struct State {
    sessions: BTreeMap<String, BTreeMap<u32, FakeWindow>>,
    env: BTreeMap<String, BTreeMap<String, String>>,
    commands: Vec<Recorded>,
    failures: Vec<String>,
    /// Index tmux gives the initial window, as set by `base-index`.
    base_index: u32,
}

#[derive(Debug, Default)]
pub struct RecordingMux {
    state: Mutex<State>,
}

fn failed(command: &str, stderr: &str) -> TmuxError {
    TmuxError::CommandFailed {
        command: command.to_string(),
        stderr: stderr.to_string(),
    }
}

/// `cd '<dir>'` as produced by `set_pane_cwd`.
fn cd_target(line: &str) -> Option<String> {
    let quoted = line.strip_prefix("cd ")?;
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("'\\''", "'"))
}

impl RecordingMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server whose `base-index` puts the initial window at `base`.
    pub fn with_base_index(base: u32) -> Self {
        let mux = Self::default();
        mux.state.lock().unwrap().base_index = base;
        mux
    }

    /// Every later command whose text contains `pattern` fails.
    pub fn fail_matching(&self, pattern: &str) {
        self.state.lock().unwrap().failures.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn commands(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.commands.iter().map(|c| c.line.clone()).collect()
    }

    /// Commands that change multiplexer state.
    pub fn write_commands(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .commands
            .iter()
            .filter(|c| c.write)
            .map(|c| c.line.clone())
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    pub fn pane_path(&self, session: &str, window: u32, pane: u32) -> Option<String> {
        self.pane(session, window, pane).map(|p| p.path)
    }

    pub fn pane_title(&self, session: &str, window: u32, pane: u32) -> Option<String> {
        self.pane(session, window, pane).map(|p| p.title)
    }

    pub fn window_indices(&self, session: &str) -> Vec<u32> {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .get(session)
            .map(|windows| windows.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn window_name(&self, session: &str, window: u32) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .get(session)?
            .get(&window)
            .map(|w| w.name.clone())
    }

    fn pane(&self, session: &str, window: u32, pane: u32) -> Option<FakePane> {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .get(session)?
            .get(&window)?
            .panes
            .get(pane as usize)
            .cloned()
    }

    /// Records the command, then applies the configured failures.
    fn record(&self, state: &mut State, line: String, write: bool) -> Result<(), TmuxError> {
        let fails = state.failures.iter().any(|f| line.contains(f.as_str()));
        state.commands.push(Recorded {
            line: line.clone(),
            write,
        });
        if fails {
            return Err(failed(&line, "simulated failure"));
        }
        Ok(())
    }

    fn with_window<T>(
        &self,
        line: String,
        write: bool,
        session: &str,
        window: u32,
        f: impl FnOnce(&mut FakeWindow) -> Result<T, TmuxError>,
    ) -> Result<T, TmuxError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, line.clone(), write)?;
        let target = state
            .sessions
            .get_mut(session)
            .and_then(|windows| windows.get_mut(&window))
            .ok_or_else(|| failed(&line, "can't find window"))?;
        f(target)
    }
}

#[async_trait]
impl Multiplexer for RecordingMux {
    async fn has_session(&self, session: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let line = format!("has-session -t {session}");
        self.record(&mut state, line, false).is_ok() && state.sessions.contains_key(session)
    }

    async fn new_session(&self, session: &str, working_dir: &Path) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("new-session -d -s {session} -c {}", working_dir.display());
        self.record(&mut state, line.clone(), true)?;
        if state.sessions.contains_key(session) {
            return Err(failed(&line, "duplicate session"));
        }
        let window = FakeWindow {
            name: "bash".to_string(),
            panes: vec![FakePane {
                path: working_dir.display().to_string(),
                title: String::new(),
            }],
        };
        let base = state.base_index;
        state
            .sessions
            .insert(session.to_string(), BTreeMap::from([(base, window)]));
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("kill-session -t {session}");
        self.record(&mut state, line.clone(), true)?;
        state.env.remove(session);
        state
            .sessions
            .remove(session)
            .map(|_| ())
            .ok_or_else(|| failed(&line, "can't find session"))
    }

    async fn set_option(&self, session: &str, option: &str, value: &str) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("set-option -t {session} {option} {value}");
        self.record(&mut state, line, true)
    }

    async fn set_window_option(
        &self,
        session: &str,
        window: u32,
        option: &str,
        value: &str,
    ) -> Result<(), TmuxError> {
        let line = format!(
            "set-window-option -t {} {option} {value}",
            window_target(session, window)
        );
        self.with_window(line, true, session, window, |_| Ok(()))
    }

    async fn move_window(&self, session: &str, from: u32, to: u32) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!(
            "move-window -s {} -t {}",
            window_target(session, from),
            window_target(session, to)
        );
        self.record(&mut state, line.clone(), true)?;
        let windows = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| failed(&line, "can't find session"))?;
        if windows.contains_key(&to) {
            return Err(failed(&line, "index in use"));
        }
        let moved = windows
            .remove(&from)
            .ok_or_else(|| failed(&line, "can't find window"))?;
        windows.insert(to, moved);
        Ok(())
    }

    async fn set_env(&self, session: &str, key: &str, value: &str) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("set-environment -t {session} {key} {value}");
        self.record(&mut state, line.clone(), true)?;
        if !state.sessions.contains_key(session) {
            return Err(failed(&line, "can't find session"));
        }
        state
            .env
            .entry(session.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_env(&self, session: &str, key: &str) -> Result<Option<String>, TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("show-environment -t {session} {key}");
        self.record(&mut state, line, false)?;
        Ok(state.env.get(session).and_then(|env| env.get(key)).cloned())
    }

    async fn new_window(
        &self,
        session: &str,
        window: u32,
        name: &str,
        working_dir: &Path,
    ) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!(
            "new-window -d -t {} -n {name} -c {}",
            window_target(session, window),
            working_dir.display()
        );
        self.record(&mut state, line.clone(), true)?;
        let windows = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| failed(&line, "can't find session"))?;
        if windows.contains_key(&window) {
            return Err(failed(&line, "index in use"));
        }
        windows.insert(
            window,
            FakeWindow {
                name: name.to_string(),
                panes: vec![FakePane {
                    path: working_dir.display().to_string(),
                    title: String::new(),
                }],
            },
        );
        Ok(())
    }

    async fn rename_window(&self, session: &str, window: u32, name: &str) -> Result<(), TmuxError> {
        let line = format!("rename-window -t {} {name}", window_target(session, window));
        self.with_window(line, true, session, window, |w| {
            w.name = name.to_string();
            Ok(())
        })
    }

    async fn kill_window(&self, session: &str, window: u32) -> Result<(), TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("kill-window -t {}", window_target(session, window));
        self.record(&mut state, line.clone(), true)?;
        state
            .sessions
            .get_mut(session)
            .and_then(|windows| windows.remove(&window))
            .map(|_| ())
            .ok_or_else(|| failed(&line, "can't find window"))
    }

    async fn select_window(&self, session: &str, window: u32) -> Result<(), TmuxError> {
        let line = format!("select-window -t {}", window_target(session, window));
        self.with_window(line, false, session, window, |_| Ok(()))
    }

    async fn split_pane(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        direction: SplitDirection,
        working_dir: &Path,
    ) -> Result<(), TmuxError> {
        let line = format!(
            "split-window {} -t {} -c {}",
            direction.flag(),
            pane_target(session, window, pane),
            working_dir.display()
        );
        let err_line = line.clone();
        self.with_window(line, true, session, window, |w| {
            let at = pane as usize;
            if at >= w.panes.len() {
                return Err(failed(&err_line, "can't find pane"));
            }
            w.panes.insert(
                at + 1,
                FakePane {
                    path: working_dir.display().to_string(),
                    title: String::new(),
                },
            );
            Ok(())
        })
    }

    async fn select_layout(&self, session: &str, window: u32, layout: &str) -> Result<(), TmuxError> {
        let line = format!("select-layout -t {} {layout}", window_target(session, window));
        self.with_window(line, true, session, window, |_| Ok(()))
    }

    async fn send_line(&self, session: &str, window: u32, pane: u32, line: &str) -> Result<(), TmuxError> {
        let command = format!("send-keys -t {} {line} Enter", pane_target(session, window, pane));
        let err_line = command.clone();
        self.with_window(command, true, session, window, |w| {
            let target = w
                .panes
                .get_mut(pane as usize)
                .ok_or_else(|| failed(&err_line, "can't find pane"))?;
            if let Some(dir) = cd_target(line) {
                target.path = dir;
            }
            Ok(())
        })
    }

    async fn set_pane_title(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        title: &str,
    ) -> Result<(), TmuxError> {
        let command = format!("select-pane -t {} -T {title}", pane_target(session, window, pane));
        let err_line = command.clone();
        self.with_window(command, true, session, window, |w| {
            let target = w
                .panes
                .get_mut(pane as usize)
                .ok_or_else(|| failed(&err_line, "can't find pane"))?;
            target.title = title.to_string();
            Ok(())
        })
    }

    async fn list_sessions(&self) -> Result<Vec<String>, TmuxError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "list-sessions".to_string(), false)?;
        Ok(state.sessions.keys().cloned().collect())
    }

    async fn list_windows(&self, session: &str) -> Result<Vec<WindowInfo>, TmuxError> {
        let mut state = self.state.lock().unwrap();
        let line = format!("list-windows -t {session}");
        self.record(&mut state, line.clone(), false)?;
        let windows = state
            .sessions
            .get(session)
            .ok_or_else(|| failed(&line, "can't find session"))?;
        Ok(windows
            .iter()
            .map(|(index, w)| WindowInfo {
                index: *index,
                name: w.name.clone(),
                panes: w.panes.len() as u32,
            })
            .collect())
    }

    async fn list_panes(&self, session: &str, window: u32) -> Result<Vec<PaneInfo>, TmuxError> {
        let line = format!("list-panes -t {}", window_target(session, window));
        self.with_window(line, false, session, window, |w| {
            Ok(w.panes
                .iter()
                .enumerate()
                .map(|(i, p)| PaneInfo {
                    index: i as u32,
                    current_path: p.path.clone(),
                    title: p.title.clone(),
                })
                .collect())
        })
    }

    async fn capture_pane(&self, session: &str, window: u32, pane: u32) -> Result<String, TmuxError> {
        let line = format!("capture-pane -p -t {}", pane_target(session, window, pane));
        let err_line = line.clone();
        self.with_window(line, false, session, window, |w| {
            let target = w
                .panes
                .get(pane as usize)
                .ok_or_else(|| failed(&err_line, "can't find pane"))?;
            Ok(format!("{}\n{}\n", target.title, target.path))
        })
    }
}
