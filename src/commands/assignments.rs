use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args as ClapArgs;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

use crate::commands::common;
use crate::config::{Config, SpaceConfig};
use crate::ledger::Claim;
use crate::models::Desk;
use crate::topology::generate_desks;
use crate::utils::{pad_display, truncate_str, Glyph};

#[derive(ClapArgs)]
pub struct Args {
    /// Space document (YAML)
    pub space: PathBuf,
}

/// One desk of the assignment table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AssignmentRow {
    task: Option<String>,
    room: String,
    role: String,
    agent_id: String,
    since: Option<DateTime<Utc>>,
}

/// One row per generated desk, in desk order. Desks without an active claim
/// have no task.
fn assignment_rows(desks: &[Desk], claims: &HashMap<String, Claim>) -> Vec<AssignmentRow> {
    desks
        .iter()
        .map(|desk| {
            let agent_id = desk.agent_id();
            let claim = claims.get(&agent_id);
            AssignmentRow {
                task: claim.map(|c| c.record.task_name.clone()),
                room: desk.room_name.clone(),
                role: desk.role.display_title().to_string(),
                since: claim
                    .map(|c| c.record.assigned_at)
                    .filter(|at| *at != DateTime::<Utc>::UNIX_EPOCH),
                agent_id,
            }
        })
        .collect()
}

/// Active claims whose agent id names no desk of the space, by agent id.
fn orphan_claims<'a>(desks: &[Desk], claims: &'a HashMap<String, Claim>) -> Vec<&'a Claim> {
    let mut orphans: Vec<&Claim> = claims
        .iter()
        .filter(|(agent_id, _)| !desks.iter().any(|d| &d.agent_id() == *agent_id))
        .map(|(_, claim)| claim)
        .collect();
    orphans.sort_by(|a, b| a.record.agent_id.cmp(&b.record.agent_id));
    orphans
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = SpaceConfig::load(&args.space)?;
    let base_path = space.resolved_base_path()?;
    let ledger = common::controller(config).ledger(&base_path);

    let desks = generate_desks(&space.organizations, &space.effective_rooms());
    let claims = ledger.active_claims(&space.session_name()).await;
    let rows = assignment_rows(&desks, &claims);

    println!(
        "{} {} {} {} {}",
        pad_display("TASK", 32),
        pad_display("ROOM", 16),
        pad_display("ROLE", 20),
        pad_display("AGENT", 16),
        "SINCE"
    );
    println!("{}", "-".repeat(100));

    for row in &rows {
        let task = row
            .task
            .clone()
            .unwrap_or_else(|| config.standby.marker.clone());
        let since = row
            .since
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} {} {} {}",
            pad_display(&truncate_str(&task, 32), 32),
            pad_display(&truncate_str(&row.room, 16), 16),
            pad_display(&truncate_str(&row.role, 20), 20),
            pad_display(&row.agent_id, 16),
            since
        );
    }

    let on_task = rows.iter().filter(|r| r.task.is_some()).count();
    println!("{} of {} desks on a task", on_task, rows.len());

    for claim in orphan_claims(&desks, &claims) {
        warn!(
            agent_id = %claim.record.agent_id,
            task = %claim.record.task_name,
            "active assignment for an agent with no desk in this space"
        );
        println!(
            "{} {} holds {} but has no desk",
            Glyph::Warn,
            claim.record.agent_id,
            claim.record.task_name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AssignmentRecord;
    use crate::models::{default_rooms, Organization};

    fn claim(agent_id: &str, task: &str) -> (String, Claim) {
        (
            agent_id.to_string(),
            Claim {
                task_dir: PathBuf::from("/srv/acme/tasks").join(task),
                record: AssignmentRecord::active(agent_id, task, "acme"),
            },
        )
    }

    fn desks() -> Vec<Desk> {
        let orgs: Vec<Organization> = (1..=5)
            .map(|i| Organization::new(format!("{i:02}"), format!("Team {i}"), "dept"))
            .collect();
        generate_desks(&orgs, &default_rooms())
    }

    #[test]
    fn every_desk_gets_a_row_and_claims_fill_the_task() {
        let desks = desks();
        let claims: HashMap<String, Claim> = [claim("org02-wk-a-r1", "api")].into_iter().collect();

        let rows = assignment_rows(&desks, &claims);

        assert_eq!(rows.len(), 20);
        let api = rows.iter().find(|r| r.agent_id == "org02-wk-a-r1").unwrap();
        assert_eq!(api.task.as_deref(), Some("api"));
        assert_eq!(api.role, "WORKER-A");
        assert!(api.since.is_some());
        assert_eq!(rows.iter().filter(|r| r.task.is_some()).count(), 1);
        assert_eq!(rows[16].role, "CEO", "assignment_rows: executive desks come last");
    }

    #[test]
    fn epoch_timestamps_are_shown_as_unknown() {
        let desks = desks();
        let (agent, mut c) = claim("org01-pm-r1", "legacy");
        c.record = c.record.with_assigned_at(DateTime::<Utc>::UNIX_EPOCH);
        let claims: HashMap<String, Claim> = [(agent, c)].into_iter().collect();

        let rows = assignment_rows(&desks, &claims);
        assert_eq!(rows[0].task.as_deref(), Some("legacy"));
        assert_eq!(rows[0].since, None);
    }

    #[test]
    fn claims_without_a_desk_are_reported() {
        let desks = desks();
        let claims: HashMap<String, Claim> = [
            claim("org01-pm-r1", "login"),
            claim("org09-pm-r1", "ghost"),
            claim("org07-pm-r2", "phantom"),
        ]
        .into_iter()
        .collect();

        let orphans: Vec<&str> = orphan_claims(&desks, &claims)
            .iter()
            .map(|c| c.record.agent_id.as_str())
            .collect();
        assert_eq!(orphans, vec!["org07-pm-r2", "org09-pm-r1"]);
    }
}
