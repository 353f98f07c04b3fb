use anyhow::{bail, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::{Config, SpaceConfig, TaskConfig};
use crate::utils::Glyph;

#[derive(ClapArgs)]
pub struct Args {
    /// Space document (YAML)
    pub space: PathBuf,

    /// Task name
    #[arg(short, long)]
    pub task: String,

    /// Agent id to release (default: the task's declared assignee)
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Branch name, for tasks not declared in the space
    #[arg(short, long)]
    pub branch: Option<String>,
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = SpaceConfig::load(&args.space)?;

    let mut task = match (space.find_task(&args.task), &args.assignee) {
        (Some(task), _) => task.clone(),
        (None, Some(assignee)) => TaskConfig::new(&args.task, assignee),
        (None, None) => bail!(
            "Task {} is not declared in the space; pass --assignee",
            args.task
        ),
    };
    if let Some(assignee) = args.assignee {
        task.assignee = assignee;
    }
    if args.branch.is_some() {
        task.branch = args.branch;
    }

    let mut controller = common::controller(config);
    if !controller.provisioner(&space)?.release(&task).await? {
        println!("{} {} holds no active assignment for {}", Glyph::Warn, task.assignee, task.name);
        return Ok(());
    }
    println!("{} {} released from {}", Glyph::Success, task.assignee, task.name);

    if let Some(session) = common::attach_if_running(&mut controller, &space).await? {
        let report = controller.reconcile(&session).await?;
        println!("Reconciled {}: {} desk(s) moved", session, report.changed());
    }
    Ok(())
}
