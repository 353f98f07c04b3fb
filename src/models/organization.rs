use serde::{Deserialize, Serialize};

/// An organization as supplied by the space document. List position, not
/// `id`, decides which room its desks land in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default = "unknown_department")]
    pub department_id: String,
}

fn unknown_department() -> String {
    "unknown".to_string()
}

impl Organization {
    pub fn new(id: impl Into<String>, name: impl Into<String>, department_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department_id: department_id.into(),
        }
    }

    /// Synthetic stand-in for the organization at 1-based position `number`.
    pub fn placeholder(number: usize) -> Self {
        Self::new(
            format!("{number:02}"),
            format!("Organization {number}"),
            unknown_department(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    pub name: String,
}

impl RoomConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Window name: the room name without a trailing " Room".
    pub fn window_name(&self) -> String {
        let name = self.name.trim();
        let short = name.strip_suffix(" Room").unwrap_or(name);
        if short.is_empty() {
            self.id.clone()
        } else {
            short.to_string()
        }
    }
}

pub fn default_organizations() -> Vec<Organization> {
    vec![
        Organization::new("01", "Frontend Development Team", "frontend"),
        Organization::new("02", "Backend Development Team", "backend"),
        Organization::new("03", "DevOps Infrastructure Team", "devops"),
        Organization::new("04", "Quality Assurance Team", "qa"),
        Organization::new("05", "Executive Leadership", "executive"),
    ]
}

pub fn default_rooms() -> Vec<RoomConfig> {
    vec![
        RoomConfig::new("room-01", "Alpha Room"),
        RoomConfig::new("room-02", "Beta Room"),
        RoomConfig::new("room-executive", "Executive Room"),
    ]
}
