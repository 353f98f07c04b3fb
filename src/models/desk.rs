use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeskRole {
    Pm,
    WorkerA,
    WorkerB,
    WorkerC,
    Ceo,
    Cto,
    Coo,
    Assistant,
}

impl DeskRole {
    pub const TEAM: [DeskRole; 4] = [
        DeskRole::Pm,
        DeskRole::WorkerA,
        DeskRole::WorkerB,
        DeskRole::WorkerC,
    ];

    pub const EXECUTIVE: [DeskRole; 4] = [
        DeskRole::Ceo,
        DeskRole::Cto,
        DeskRole::Coo,
        DeskRole::Assistant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeskRole::Pm => "pm",
            DeskRole::WorkerA => "worker-a",
            DeskRole::WorkerB => "worker-b",
            DeskRole::WorkerC => "worker-c",
            DeskRole::Ceo => "ceo",
            DeskRole::Cto => "cto",
            DeskRole::Coo => "coo",
            DeskRole::Assistant => "assistant",
        }
    }

    #[cfg(test)]
    pub fn is_executive(&self) -> bool {
        Self::EXECUTIVE.contains(self)
    }

    /// Role segment of an agent id: `worker-a` becomes `wk-a`.
    pub fn agent_part(&self) -> &'static str {
        match self {
            DeskRole::WorkerA => "wk-a",
            DeskRole::WorkerB => "wk-b",
            DeskRole::WorkerC => "wk-c",
            other => other.as_str(),
        }
    }

    /// Human label used in pane titles.
    pub fn display_title(&self) -> &'static str {
        match self {
            DeskRole::Pm => "PM",
            DeskRole::WorkerA => "WORKER-A",
            DeskRole::WorkerB => "WORKER-B",
            DeskRole::WorkerC => "WORKER-C",
            DeskRole::Ceo => "CEO",
            DeskRole::Cto => "CTO",
            DeskRole::Coo => "COO",
            DeskRole::Assistant => "Executive Assistant",
        }
    }

    /// Directory name of a desk: `01pm`, `01a`, ..., `exec-ceo`.
    pub fn directory_name(&self, org_number: usize) -> String {
        match self {
            DeskRole::Pm => format!("{org_number:02}pm"),
            DeskRole::WorkerA => format!("{org_number:02}a"),
            DeskRole::WorkerB => format!("{org_number:02}b"),
            DeskRole::WorkerC => format!("{org_number:02}c"),
            exec => format!("exec-{}", exec.as_str()),
        }
    }
}

impl std::fmt::Display for DeskRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed placement slots of the desk generator. The slot, not the room id
/// string, decides the agent id suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomSlot {
    Alpha,
    Beta,
    Executive,
}

impl RoomSlot {
    /// Position of the slot's room in the declared room list.
    pub fn ordinal(&self) -> usize {
        match self {
            RoomSlot::Alpha => 0,
            RoomSlot::Beta => 1,
            RoomSlot::Executive => 2,
        }
    }

    pub fn agent_suffix(&self) -> &'static str {
        match self {
            RoomSlot::Alpha => "r1",
            RoomSlot::Beta => "r2",
            RoomSlot::Executive => "re",
        }
    }

    pub fn default_room_id(&self) -> &'static str {
        match self {
            RoomSlot::Alpha => "room-01",
            RoomSlot::Beta => "room-02",
            RoomSlot::Executive => "room-executive",
        }
    }

    pub fn default_room_name(&self) -> &'static str {
        match self {
            RoomSlot::Alpha => "Alpha Room",
            RoomSlot::Beta => "Beta Room",
            RoomSlot::Executive => "Executive Room",
        }
    }
}

/// One unit of work capacity, bound 1:1 to a pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Desk {
    pub desk_id: String,
    pub org_id: String,
    /// 1-based position of the organization in the padded list.
    pub org_number: usize,
    pub org_name: String,
    pub role: DeskRole,
    pub slot: RoomSlot,
    pub room_id: String,
    pub room_name: String,
    pub directory_name: String,
    pub title: String,
}

impl Desk {
    /// Join key between a desk and the assignment ledger,
    /// e.g. `org01-pm-r1`, `org02-wk-a-r1`, `org05-ceo-re`.
    pub fn agent_id(&self) -> String {
        format!(
            "org{:02}-{}-{}",
            self.org_number,
            self.role.agent_part(),
            self.slot.agent_suffix()
        )
    }

    pub fn task_title(&self, task_name: &str) -> String {
        format!("{} [Task: {}]", self.title, task_name)
    }

    pub fn standby_title(&self, marker: &str) -> String {
        format!("{} - {} - {}", self.org_name, marker, self.room_name)
    }
}
