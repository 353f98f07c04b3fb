use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::models::{Desk, RoomConfig};

/// Where a desk's pane should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskTarget {
    Task { task_name: String, directory: PathBuf },
    Standby { directory: PathBuf },
}

impl DeskTarget {
    pub fn directory(&self) -> &PathBuf {
        match self {
            DeskTarget::Task { directory, .. } | DeskTarget::Standby { directory } => directory,
        }
    }

    pub fn title_for(&self, desk: &Desk, standby_marker: &str) -> String {
        match self {
            DeskTarget::Task { task_name, .. } => desk.task_title(task_name),
            DeskTarget::Standby { .. } => desk.standby_title(standby_marker),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedDesk {
    pub pane: u32,
    pub desk: Desk,
}

/// A room bound to its window, with desks bound to panes `0..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDesks {
    pub room: RoomConfig,
    pub window: u32,
    pub panes: u32,
    pub desks: Vec<PlacedDesk>,
}

impl RoomDesks {
    /// Binds desks to panes in order. Desks past the last pane are dropped;
    /// panes past the last desk stay as they are.
    pub fn place(room: RoomConfig, window: u32, panes: u32, desks: Vec<Desk>) -> Self {
        let desk_count = desks.len() as u32;
        if desk_count > panes {
            warn!(
                room_id = %room.id,
                window,
                panes,
                desks = desk_count,
                "more desks than panes, dropping the extra desks"
            );
        } else if panes > desk_count {
            info!(room_id = %room.id, window, idle_panes = panes - desk_count, "panes without a desk");
        }

        let placed = desks
            .into_iter()
            .take(panes as usize)
            .enumerate()
            .map(|(i, desk)| PlacedDesk {
                pane: i as u32,
                desk,
            })
            .collect();

        Self {
            room,
            window,
            panes,
            desks: placed,
        }
    }
}

/// Resolved configuration of one session known to this process.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session_name: String,
    pub base_path: PathBuf,
    pub rooms: Vec<RoomDesks>,
    /// Generated desks that have no pane to drive.
    pub unplaced: usize,
    /// Last target applied to each `(window, pane)` by this process.
    placements: HashMap<(u32, u32), DeskTarget>,
}

impl SessionEntry {
    pub fn new(session_name: impl Into<String>, base_path: PathBuf, rooms: Vec<RoomDesks>) -> Self {
        Self {
            session_name: session_name.into(),
            base_path,
            rooms,
            unplaced: 0,
            placements: HashMap::new(),
        }
    }

    pub fn with_unplaced(mut self, unplaced: usize) -> Self {
        self.unplaced = unplaced;
        self
    }

    #[cfg(test)]
    pub fn room(&self, room_id: &str) -> Option<&RoomDesks> {
        self.rooms.iter().find(|r| r.room.id == room_id)
    }

    pub fn desk_count(&self) -> usize {
        self.rooms.iter().map(|r| r.desks.len()).sum()
    }

    pub fn last_placement(&self, window: u32, pane: u32) -> Option<&DeskTarget> {
        self.placements.get(&(window, pane))
    }

    pub fn remember(&mut self, window: u32, pane: u32, target: DeskTarget) {
        self.placements.insert((window, pane), target);
    }

    pub fn forget(&mut self, window: u32, pane: u32) {
        self.placements.remove(&(window, pane));
    }
}

/// In-process view of the sessions this controller manages. A cache only:
/// every entry can be rebuilt from the space document and the mapping file.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry, replacing any previous one for the same session.
    pub fn register(&mut self, entry: SessionEntry) -> Option<SessionEntry> {
        info!(
            session = %entry.session_name,
            rooms = entry.rooms.len(),
            desks = entry.desk_count(),
            "registered session"
        );
        self.sessions.insert(entry.session_name.clone(), entry)
    }

    pub fn get(&self, session: &str) -> Option<&SessionEntry> {
        self.sessions.get(session)
    }

    pub fn get_mut(&mut self, session: &str) -> Option<&mut SessionEntry> {
        self.sessions.get_mut(session)
    }

    pub fn remove(&mut self, session: &str) -> Option<SessionEntry> {
        self.sessions.remove(session)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
