use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Released,
    /// Any status written by other tools; never counts as an assignment.
    #[serde(other)]
    Other,
}

/// One entry of a task's assignment ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub agent_id: String,
    pub task_name: String,
    #[serde(alias = "space_ref")]
    pub space_session: String,
    pub status: AssignmentStatus,
    #[serde(
        default,
        deserialize_with = "lenient_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub tmux_window: Option<u32>,
    #[serde(
        default,
        deserialize_with = "lenient_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub tmux_pane: Option<u32>,
    #[serde(
        default = "unix_epoch",
        alias = "timestamp",
        deserialize_with = "lenient_timestamp"
    )]
    pub assigned_at: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "lenient_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Window/pane indices have been written both as numbers and as strings.
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => Ok(s.trim().parse().ok()),
    }
}

/// Accepts RFC 3339, naive ISO 8601 read as UTC, and unix seconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
        Other(serde_json::Value),
    }

    let parsed = match Option::<Raw>::deserialize(deserializer)? {
        None | Some(Raw::Other(_)) => None,
        Some(Raw::Text(s)) => parse_timestamp(&s),
        Some(Raw::Seconds(secs)) if secs.is_finite() => {
            let whole = secs.floor();
            DateTime::from_timestamp(whole as i64, ((secs - whole) * 1e9) as u32)
        }
        Some(Raw::Seconds(_)) => None,
    };
    Ok(parsed)
}

/// An unreadable timestamp degrades to the epoch instead of failing the
/// whole ledger document.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_timestamp(deserializer)?.unwrap_or_else(unix_epoch))
}

impl AssignmentRecord {
    pub fn active(
        agent_id: impl Into<String>,
        task_name: impl Into<String>,
        space_session: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_name: task_name.into(),
            space_session: space_session.into(),
            status: AssignmentStatus::Active,
            tmux_window: None,
            tmux_pane: None,
            assigned_at: Utc::now(),
            updated_at: None,
            branch: None,
            description: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[cfg(test)]
    pub fn with_assigned_at(mut self, assigned_at: DateTime<Utc>) -> Self {
        self.assigned_at = assigned_at;
        self
    }

    /// A `released` record superseding this one.
    pub fn released(&self) -> Self {
        Self {
            status: AssignmentStatus::Released,
            tmux_window: None,
            tmux_pane: None,
            assigned_at: Utc::now(),
            updated_at: None,
            ..self.clone()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }

    pub fn matches(&self, agent_id: &str, space_session: &str) -> bool {
        self.agent_id == agent_id && self.space_session == space_session
    }
}
