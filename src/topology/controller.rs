use anyhow::{bail, Context, Result};
use minijinja::Environment;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::desks::{generate_desks, group_by_room};
use super::mapping::{plan_windows, RoomWindowMap, RoomWindowStore};
use super::registry::{DeskTarget, RoomDesks, SessionEntry, SessionRegistry};
use crate::config::{Config, SpaceConfig};
use crate::layout::{calculate_layout, LayoutStrategy};
use crate::ledger::AssignmentLedger;
use crate::models::{Desk, RoomConfig};
use crate::session::{
    cleanup_existing_session, log_soft_failure, normalize_base_indices, pin_pane_base_index,
    set_pane_cwd, split_window, GitManager, Multiplexer, SessionSummary, SplitReport,
    TaskProvisioner, MAIN_CHECKOUT,
};
use crate::utils::Glyph;

const STANDBY_README: &str = "README.md";

/// Session environment written at creation. Sessions without it are not
/// spaces and are never listed, rebuilt or killed.
const SPACE_ENV: &str = "DESKGRID_SPACE";
const BASE_PATH_ENV: &str = "DESKGRID_BASE_PATH";

const STANDBY_README_TEMPLATE: &str = "\
# {{ space }} standby

Desks of this space without an active task wait in this directory.

Pane titles here read `<organization> - {{ marker }} - <room>`.
Assign a task with `deskgrid assign` and run `deskgrid reconcile`
to move the assignee's pane into the task directory under
`{{ tasks_root }}`.
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub on_task: usize,
    pub on_standby: usize,
    /// Desks whose target matched the last placement this process applied.
    pub unchanged: usize,
    pub failed: usize,
    /// Desks without a pane, from an undeclared room, a failed window or a
    /// room with fewer panes than desks.
    pub skipped: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> usize {
        self.on_task + self.on_standby
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOutcome {
    Split(SplitReport),
    /// The window could not be created; its desks were not placed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub room_id: String,
    pub window: u32,
    pub outcome: WindowOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceReport {
    pub session: String,
    pub base_path: PathBuf,
    pub strategy: LayoutStrategy,
    pub windows: Vec<WindowReport>,
    /// `None` when the space declares no repository.
    pub repository_ready: Option<bool>,
    pub tasks_provisioned: usize,
    pub tasks_failed: usize,
    pub reconcile: ReconcileReport,
}

impl SpaceReport {
    pub fn total_panes(&self) -> u32 {
        self.windows
            .iter()
            .map(|w| match &w.outcome {
                WindowOutcome::Split(split) => split.pane_count(),
                WindowOutcome::Failed(_) => 0,
            })
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.windows.iter().all(|w| match &w.outcome {
            WindowOutcome::Split(split) => split.is_complete(),
            WindowOutcome::Failed(_) => false,
        }) && self.reconcile.failed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SpaceTag {
    space: String,
    base_path: Option<PathBuf>,
}

/// Creates sessions from space documents and keeps desk panes in line with
/// the assignment ledger. Owns the session registry; one instance per process.
pub struct TopologyController<M: Multiplexer> {
    mux: M,
    config: Config,
    git: GitManager,
    registry: SessionRegistry,
}

impl<M: Multiplexer> TopologyController<M> {
    pub fn new(mux: M, config: Config) -> Self {
        let git = GitManager::new(
            config.timeouts.clone_timeout(),
            config.timeouts.worktree_timeout(),
        );
        Self {
            mux,
            config,
            git,
            registry: SessionRegistry::new(),
        }
    }

    #[cfg(test)]
    pub fn mux(&self) -> &M {
        &self.mux
    }

    #[cfg(test)]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn mapping_store(&self, base_path: &Path) -> RoomWindowStore {
        RoomWindowStore::new(base_path, &self.config.metadata_dir)
    }

    pub fn ledger(&self, base_path: &Path) -> AssignmentLedger {
        AssignmentLedger::new(base_path.join("tasks"), self.config.metadata_dir.clone())
    }

    pub fn provisioner(&self, space: &SpaceConfig) -> Result<TaskProvisioner> {
        let base = space.resolved_base_path()?;
        Ok(TaskProvisioner::new(
            base.join("tasks"),
            space.session_name(),
            self.git.clone(),
            self.ledger(&base),
        )
        .with_env_files(space.env_files.clone()))
    }

    async fn space_tag(&self, session: &str) -> Result<Option<SpaceTag>> {
        let Some(space) = self.mux.get_env(session, SPACE_ENV).await? else {
            return Ok(None);
        };
        let base_path = self
            .mux
            .get_env(session, BASE_PATH_ENV)
            .await?
            .map(PathBuf::from);
        Ok(Some(SpaceTag { space, base_path }))
    }

    async fn require_space_tag(&self, session: &str) -> Result<SpaceTag> {
        self.space_tag(session).await?.with_context(|| {
            format!(
                "Session {} exists but was not created by deskgrid; leaving it alone",
                session
            )
        })
    }

    async fn tag_session(&self, session: &str, space: &SpaceConfig, base_path: &Path) -> Result<()> {
        self.mux
            .set_env(session, SPACE_ENV, &space.name)
            .await
            .with_context(|| format!("Failed to tag session {}", session))?;
        self.mux
            .set_env(session, BASE_PATH_ENV, &base_path.to_string_lossy())
            .await
            .with_context(|| format!("Failed to tag session {}", session))?;
        Ok(())
    }

    fn standby_dir(&self, base_path: &Path) -> PathBuf {
        base_path.join(&self.config.standby.directory)
    }

    /// Creates the shared standby directory and renders its README once.
    async fn ensure_standby_dir(&self, session: &str, base_path: &Path) -> Result<PathBuf> {
        let dir = self.standby_dir(base_path);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create standby directory {:?}", dir))?;

        let readme = dir.join(STANDBY_README);
        if !readme.exists() {
            let content = render_standby_readme(
                session,
                &self.config.standby.marker,
                &base_path.join("tasks"),
            )?;
            tokio::fs::write(&readme, content)
                .await
                .with_context(|| format!("Failed to write {:?}", readme))?;
            debug!(path = ?readme, "rendered standby README");
        }
        Ok(dir)
    }

    async fn prepare_repository(&self, space: &SpaceConfig, tasks_root: &Path) -> Option<bool> {
        let repo = space.git_repo.as_ref()?;
        let dest = tasks_root.join(MAIN_CHECKOUT);
        match self
            .git
            .clone_repository(&repo.url, &dest, repo.default_branch.as_deref())
            .await
        {
            Ok(outcome) => {
                info!(url = %repo.url, ?outcome, "repository ready");
                Some(true)
            }
            Err(e) => {
                log_soft_failure("clone", &e);
                Some(false)
            }
        }
    }

    async fn configure_pane_borders(&self, session: &str) {
        for (option, value) in [
            ("pane-border-status", "top"),
            ("pane-border-format", "#{pane_title}"),
        ] {
            if let Err(e) = self.mux.set_option(session, option, value).await {
                warn!(session, option, error = %e, status = %Glyph::Warn, "failed to set pane border option");
            }
        }
    }

    /// Creates one window per planned room. Returns the windows that exist
    /// afterwards and the failures of those that do not.
    async fn create_windows(
        &self,
        session: &str,
        base_path: &Path,
        planned: &[(RoomConfig, u32)],
    ) -> (HashMap<String, u32>, HashMap<String, String>) {
        let mut created = HashMap::new();
        let mut failed = HashMap::new();

        for (room, window) in planned {
            let name = room.window_name();
            let result = if *window == 0 {
                self.mux.rename_window(session, 0, &name).await
            } else {
                let created = self.mux.new_window(session, *window, &name, base_path).await;
                if created.is_ok() {
                    if let Err(e) = pin_pane_base_index(&self.mux, session, *window).await {
                        warn!(session, window, error = %e, "failed to pin pane-base-index");
                    }
                }
                created
            };
            match result {
                Ok(()) => {
                    info!(session, room_id = %room.id, window, name = %name, "window ready");
                    created.insert(room.id.clone(), *window);
                }
                Err(e) => {
                    error!(session, room_id = %room.id, window, error = %e, status = %Glyph::Error, "failed to create window");
                    failed.insert(room.id.clone(), e.to_string());
                }
            }
        }

        if !planned.iter().any(|(_, window)| *window == 0) {
            // The initial window belongs to no room.
            if let Err(e) = self.mux.kill_window(session, 0).await {
                warn!(session, error = %e, "failed to remove the initial window");
            }
        }

        (created, failed)
    }

    /// Builds the whole session for a space: directories, repository, task
    /// working copies, windows, panes, then one reconciliation pass.
    pub async fn create_space(&mut self, space: &SpaceConfig) -> Result<SpaceReport> {
        let session = space.session_name();
        let base_path = space.resolved_base_path()?;
        let tasks_root = base_path.join("tasks");
        let grid = space.effective_grid();
        info!(session = %session, base = ?base_path, grid = %grid, "creating space");

        if self.mux.has_session(&session).await {
            self.require_space_tag(&session).await?;
        }
        cleanup_existing_session(&self.mux, &session)
            .await
            .with_context(|| format!("Failed to clean up existing session {}", session))?;
        self.registry.remove(&session);

        tokio::fs::create_dir_all(&tasks_root)
            .await
            .with_context(|| format!("Failed to create {:?}", tasks_root))?;

        let repository_ready = self.prepare_repository(space, &tasks_root).await;

        let provisioner = self.provisioner(space)?;
        let mut tasks_provisioned = 0;
        let mut tasks_failed = 0;
        for task in &space.tasks {
            match provisioner.provision(task).await {
                Ok(_) => tasks_provisioned += 1,
                Err(e) => {
                    tasks_failed += 1;
                    error!(task = %task.name, error = %e, status = %Glyph::Error, "failed to provision task");
                }
            }
        }

        let rooms = space.effective_rooms();
        let desks = generate_desks(&space.organizations, &rooms);
        let layout = calculate_layout(&grid, rooms.len());
        if layout.strategy.is_degraded() {
            warn!(session = %session, grid = %grid, rooms = rooms.len(), status = %Glyph::Warn, "space uses the degraded 4x4 fallback layout");
        }

        self.mux
            .new_session(&session, &base_path)
            .await
            .with_context(|| format!("Failed to create session {}", session))?;
        normalize_base_indices(&self.mux, &session)
            .await
            .with_context(|| format!("Failed to renumber the windows of {}", session))?;
        self.tag_session(&session, space, &base_path).await?;
        self.configure_pane_borders(&session).await;

        let store = self.mapping_store(&base_path);
        let existing = store.load(&session).await;
        let planned = plan_windows(&existing, &rooms);
        let (created, failed) = self.create_windows(&session, &base_path, &planned).await;

        let mapping: RoomWindowMap = planned
            .iter()
            .map(|(room, window)| (room.id.clone(), *window))
            .collect();
        let mapping = store.save(&session, &mapping).await?;

        let mut by_room: HashMap<String, Vec<Desk>> = group_by_room(&desks).into_iter().collect();
        for (room_id, orphans) in &by_room {
            if !rooms.iter().any(|r| &r.id == room_id) {
                warn!(room_id = %room_id, desks = orphans.len(), "room not declared, its desks get no pane");
            }
        }

        let mut windows = Vec::with_capacity(rooms.len());
        let mut placed_rooms = Vec::with_capacity(rooms.len());
        for (position, room) in rooms.iter().enumerate() {
            let window = mapping.get(&room.id).copied().unwrap_or(0);
            if let Some(reason) = failed.get(&room.id) {
                windows.push(WindowReport {
                    room_id: room.id.clone(),
                    window,
                    outcome: WindowOutcome::Failed(reason.clone()),
                });
                continue;
            }
            if !created.contains_key(&room.id) {
                continue;
            }

            let plan = layout.split_plan_for_room(position);
            let split = split_window(&self.mux, &session, window, plan, &base_path).await;
            let room_desks = by_room.remove(&room.id).unwrap_or_default();
            placed_rooms.push(RoomDesks::place(
                room.clone(),
                window,
                split.pane_count(),
                room_desks,
            ));
            windows.push(WindowReport {
                room_id: room.id.clone(),
                window,
                outcome: WindowOutcome::Split(split),
            });
        }
        placed_rooms.sort_by_key(|r| r.window);
        let unplaced = unplaced_desks(desks.len(), &placed_rooms);

        self.registry.register(
            SessionEntry::new(&session, base_path.clone(), placed_rooms).with_unplaced(unplaced),
        );
        let reconcile = self.reconcile(&session).await?;

        let report = SpaceReport {
            session: session.clone(),
            base_path,
            strategy: layout.strategy,
            windows,
            repository_ready,
            tasks_provisioned,
            tasks_failed,
            reconcile,
        };
        let status = if report.is_complete() {
            Glyph::Success
        } else {
            Glyph::Warn
        };
        info!(
            session = %session,
            windows = report.windows.len(),
            panes = report.total_panes(),
            status = %status,
            "space created"
        );
        Ok(report)
    }

    /// One reconciliation pass over every desk of a registered session, in
    /// room-then-pane order. Per-pane failures are logged and counted.
    pub async fn reconcile(&mut self, session: &str) -> Result<ReconcileReport> {
        let Some(entry) = self.registry.get(session) else {
            bail!("Session {} is not registered", session);
        };
        let base_path = entry.base_path.clone();
        let rooms = entry.rooms.clone();
        let unplaced = entry.unplaced;

        let ledger = self.ledger(&base_path);
        let claims = ledger.active_claims(session).await;
        let standby_dir = self.ensure_standby_dir(session, &base_path).await?;
        let marker = self.config.standby.marker.clone();

        let mut report = ReconcileReport {
            skipped: unplaced,
            ..ReconcileReport::default()
        };
        let mut updates: Vec<(u32, u32, Option<DeskTarget>)> = Vec::new();

        for room in &rooms {
            for placed in &room.desks {
                let desk = &placed.desk;
                let agent_id = desk.agent_id();
                let claim = claims.get(&agent_id);
                let target = match claim {
                    Some(claim) => DeskTarget::Task {
                        task_name: claim.record.task_name.clone(),
                        directory: claim.task_dir.clone(),
                    },
                    None => DeskTarget::Standby {
                        directory: standby_dir.clone(),
                    },
                };

                let last = self
                    .registry
                    .get(session)
                    .and_then(|e| e.last_placement(room.window, placed.pane));
                if last == Some(&target) {
                    report.unchanged += 1;
                    continue;
                }

                match self
                    .apply_target(session, room.window, placed.pane, desk, &target, &marker)
                    .await
                {
                    Ok(()) => {
                        if let Some(claim) = claim {
                            report.on_task += 1;
                            if let Err(e) = ledger
                                .record_placement(
                                    &claim.task_dir,
                                    &agent_id,
                                    session,
                                    room.window,
                                    placed.pane,
                                )
                                .await
                            {
                                warn!(agent_id = %agent_id, error = %e, "failed to record pane placement");
                            }
                        } else {
                            report.on_standby += 1;
                        }
                        updates.push((room.window, placed.pane, Some(target)));
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(
                            session,
                            window = room.window,
                            pane = placed.pane,
                            agent_id = %agent_id,
                            error = %e,
                            status = %Glyph::Error,
                            "failed to place desk"
                        );
                        updates.push((room.window, placed.pane, None));
                    }
                }
            }
        }

        if let Some(entry) = self.registry.get_mut(session) {
            for (window, pane, target) in updates {
                match target {
                    Some(target) => entry.remember(window, pane, target),
                    None => entry.forget(window, pane),
                }
            }
        }

        let status = if report.failed == 0 {
            Glyph::Success
        } else {
            Glyph::Warn
        };
        info!(
            session,
            on_task = report.on_task,
            on_standby = report.on_standby,
            unchanged = report.unchanged,
            failed = report.failed,
            status = %status,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    async fn apply_target(
        &self,
        session: &str,
        window: u32,
        pane: u32,
        desk: &Desk,
        target: &DeskTarget,
        marker: &str,
    ) -> Result<()> {
        set_pane_cwd(&self.mux, session, window, pane, target.directory()).await?;
        let title = target.title_for(desk, marker);
        self.mux.set_pane_title(session, window, pane, &title).await?;
        debug!(session, window, pane, title = %title, "desk placed");
        Ok(())
    }

    /// Re-registers a session created by an earlier process. Returns `false`
    /// when the multiplexer has no such session.
    pub async fn rebuild(&mut self, space: &SpaceConfig) -> Result<bool> {
        let session = space.session_name();
        if !self.mux.has_session(&session).await {
            info!(session = %session, "no running session to rebuild");
            return Ok(false);
        }
        self.require_space_tag(&session).await?;

        let base_path = space.resolved_base_path()?;
        let rooms = space.effective_rooms();
        let desks = generate_desks(&space.organizations, &rooms);
        let mapping = self.mapping_store(&base_path).load(&session).await;
        let live = self
            .mux
            .list_windows(&session)
            .await
            .with_context(|| format!("Failed to list windows of {}", session))?;

        let mut by_room: HashMap<String, Vec<Desk>> = group_by_room(&desks).into_iter().collect();
        let mut placed_rooms = Vec::new();
        for room in &rooms {
            let Some(&window) = mapping.get(&room.id) else {
                warn!(session = %session, room_id = %room.id, "room has no persisted window, skipping");
                continue;
            };
            let Some(info) = live.iter().find(|w| w.index == window) else {
                warn!(session = %session, room_id = %room.id, window, "mapped window is gone, skipping");
                continue;
            };
            let room_desks = by_room.remove(&room.id).unwrap_or_default();
            placed_rooms.push(RoomDesks::place(room.clone(), window, info.panes, room_desks));
        }
        placed_rooms.sort_by_key(|r| r.window);
        let unplaced = unplaced_desks(desks.len(), &placed_rooms);

        self.registry
            .register(SessionEntry::new(&session, base_path, placed_rooms).with_unplaced(unplaced));
        Ok(true)
    }

    /// Kills the session and forgets it. With `purge`, also drops its record
    /// from the mapping file under `base_path`, falling back to the base path
    /// the session was tagged with.
    pub async fn teardown(&mut self, session: &str, base_path: Option<&Path>, purge: bool) -> Result<bool> {
        let tag = if self.mux.has_session(session).await {
            Some(self.require_space_tag(session).await?)
        } else {
            None
        };
        let killed = cleanup_existing_session(&self.mux, session)
            .await
            .with_context(|| format!("Failed to kill session {}", session))?;
        let entry = self.registry.remove(session);

        if purge {
            let base = base_path
                .map(Path::to_path_buf)
                .or_else(|| entry.map(|e| e.base_path))
                .or_else(|| tag.and_then(|t| t.base_path));
            match base {
                Some(base) => {
                    if self.mapping_store(&base).remove(session).await? {
                        info!(session, "removed room/window mapping");
                    }
                }
                None => warn!(session, "no base path known, mapping left in place"),
            }
        }
        Ok(killed)
    }

    /// Running sessions tagged as spaces. Other tmux sessions are skipped.
    pub async fn list_spaces(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for name in self.mux.list_sessions().await? {
            let tag = match self.space_tag(&name).await {
                Ok(Some(tag)) => tag,
                Ok(None) => {
                    debug!(session = %name, "not a space session, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(session = %name, error = %e, "failed to read session environment");
                    continue;
                }
            };
            match self.mux.list_windows(&name).await {
                Ok(windows) => summaries.push(SessionSummary {
                    name,
                    space: tag.space,
                    base_path: tag.base_path,
                    windows,
                }),
                Err(e) => warn!(session = %name, error = %e, "failed to list windows"),
            }
        }
        Ok(summaries)
    }

    /// Visible text of the pane driven by `agent_id` in a registered session.
    pub async fn capture_desk(&self, session: &str, agent_id: &str) -> Result<String> {
        let entry = self
            .registry
            .get(session)
            .with_context(|| format!("Session {} is not registered", session))?;
        let (window, pane) = entry
            .rooms
            .iter()
            .find_map(|room| {
                room.desks
                    .iter()
                    .find(|placed| placed.desk.agent_id() == agent_id)
                    .map(|placed| (room.window, placed.pane))
            })
            .with_context(|| format!("Desk {} has no pane in {}", agent_id, session))?;
        self.mux
            .capture_pane(session, window, pane)
            .await
            .with_context(|| format!("Failed to capture {} in {}", agent_id, session))
    }

    /// Selects the window of a room. Unknown rooms resolve to window 0.
    pub async fn switch_to_room(&self, space: &SpaceConfig, room_id: &str) -> Result<u32> {
        let session = space.session_name();
        let base_path = space.resolved_base_path()?;
        let window = self
            .mapping_store(&base_path)
            .get_window_for_room(&session, room_id)
            .await;
        self.mux
            .select_window(&session, window)
            .await
            .with_context(|| format!("Failed to select window {} of {}", window, session))?;
        Ok(window)
    }
}

fn unplaced_desks(generated: usize, rooms: &[RoomDesks]) -> usize {
    let placed: usize = rooms.iter().map(|r| r.desks.len()).sum();
    generated.saturating_sub(placed)
}

fn render_standby_readme(space: &str, marker: &str, tasks_root: &Path) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("standby", STANDBY_README_TEMPLATE)
        .context("Failed to add standby template")?;
    let template = env
        .get_template("standby")
        .context("Failed to get standby template")?;
    let rendered = template
        .render(minijinja::context! {
            space => space,
            marker => marker,
            tasks_root => tasks_root.display().to_string(),
        })
        .context("Failed to render standby template")?;
    Ok(rendered)
}
