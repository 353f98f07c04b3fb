use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::RoomConfig;
use crate::utils::write_json_atomic;

pub const MAPPING_FILE: &str = "room_window_mapping.json";

/// `room_id -> window_index` for one session.
pub type RoomWindowMap = BTreeMap<String, u32>;

type MappingFile = BTreeMap<String, RoomWindowMap>;

/// Persisted room-to-window mapping of every session under one space base
/// path. Written when windows are created, read by everything else.
#[derive(Debug, Clone)]
pub struct RoomWindowStore {
    path: PathBuf,
}

impl RoomWindowStore {
    pub fn new(base_path: &Path, metadata_dir: &str) -> Self {
        Self {
            path: base_path.join(metadata_dir).join(MAPPING_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_all(&self) -> MappingFile {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(_) => return MappingFile::new(),
        };

        match serde_json::from_str(&content) {
            Ok(all) => all,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "malformed room/window mapping, treating as empty");
                MappingFile::new()
            }
        }
    }

    pub async fn load(&self, session: &str) -> RoomWindowMap {
        self.load_all()
            .await
            .remove(session)
            .unwrap_or_default()
    }

    /// Merges `mapping` into the session's record. Indices already persisted
    /// for a room are never rewritten; only new rooms are added. Returns the
    /// effective mapping after the merge.
    pub async fn save(&self, session: &str, mapping: &RoomWindowMap) -> Result<RoomWindowMap> {
        let mut all = self.load_all().await;
        let record = all.entry(session.to_string()).or_default();

        for (room_id, &index) in mapping {
            match record.get(room_id) {
                Some(&existing) if existing != index => {
                    warn!(
                        session,
                        room_id = %room_id,
                        existing,
                        requested = index,
                        "room already mapped to another window, keeping persisted index"
                    );
                }
                Some(_) => {}
                None => {
                    record.insert(room_id.clone(), index);
                }
            }
        }

        let effective = record.clone();
        write_json_atomic(&self.path, &all).await?;
        info!(session, rooms = effective.len(), path = ?self.path, "saved room/window mapping");
        Ok(effective)
    }

    pub async fn remove(&self, session: &str) -> Result<bool> {
        let mut all = self.load_all().await;
        if all.remove(session).is_none() {
            return Ok(false);
        }
        write_json_atomic(&self.path, &all).await?;
        Ok(true)
    }

    /// Window index for a room. Unknown rooms go to window 0, which is logged;
    /// the room id string itself is never interpreted.
    pub async fn get_window_for_room(&self, session: &str, room_id: &str) -> u32 {
        match self.load(session).await.get(room_id) {
            Some(&index) => index,
            None => {
                warn!(session, room_id, "no persisted window for room, defaulting to window 0");
                0
            }
        }
    }
}

/// Assigns a window index to every declared room. Rooms that already have a
/// persisted index keep it; new rooms are appended after the current maximum
/// in declared order. The result is sorted by window index.
pub fn plan_windows(existing: &RoomWindowMap, rooms: &[RoomConfig]) -> Vec<(RoomConfig, u32)> {
    let mut next = existing.values().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut planned: Vec<(RoomConfig, u32)> = Vec::with_capacity(rooms.len());

    for room in rooms {
        let index = match existing.get(&room.id) {
            Some(&index) => index,
            None => {
                let index = next;
                next += 1;
                index
            }
        };
        debug!(room_id = %room.id, window = index, "planned window");
        planned.push((room.clone(), index));
    }

    planned.sort_by_key(|(_, index)| *index);
    planned
}
