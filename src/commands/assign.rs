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

    /// Agent id of the desk taking the task (e.g., org01-wk-a-r1)
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Branch name (default: derived from the task name)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Task description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Env file merged into the task's .env, after the space's and the
    /// task's own (repeatable)
    #[arg(long = "env", value_name = "FILE")]
    pub env_files: Vec<PathBuf>,

    /// Do not move panes after recording the assignment
    #[arg(long)]
    pub no_reconcile: bool,
}

fn resolve_task(space: &SpaceConfig, args: &Args) -> Result<TaskConfig> {
    let mut task = match space.find_task(&args.task) {
        Some(task) => task.clone(),
        None => match &args.assignee {
            Some(assignee) => TaskConfig::new(&args.task, assignee),
            None => bail!(
                "Task {} is not declared in the space; pass --assignee",
                args.task
            ),
        },
    };

    if let Some(assignee) = &args.assignee {
        task.assignee = assignee.clone();
    }
    if args.branch.is_some() {
        task.branch = args.branch.clone();
    }
    if args.description.is_some() {
        task.description = args.description.clone();
    }
    task.env_files.extend(args.env_files.iter().cloned());

    let dir = task.checked_directory_name()?;
    if let Some(other) = space
        .tasks
        .iter()
        .find(|t| t.name != task.name && t.directory_name().eq_ignore_ascii_case(&dir))
    {
        bail!(
            "Task {} would share directory '{}' with declared task {}",
            task.name,
            dir,
            other.name
        );
    }
    Ok(task)
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = SpaceConfig::load(&args.space)?;
    let task = resolve_task(&space, &args)?;
    let mut controller = common::controller(config);

    let outcome = controller.provisioner(&space)?.provision(&task).await?;
    if outcome.recorded {
        println!(
            "{} {} assigned to {} ({})",
            Glyph::Success,
            task.assignee,
            task.name,
            outcome.task_dir.display()
        );
    } else {
        println!("{} {} already works on {}", Glyph::Warn, task.assignee, task.name);
    }

    if args.no_reconcile {
        return Ok(());
    }

    match common::attach_if_running(&mut controller, &space).await? {
        Some(session) => {
            let report = controller.reconcile(&session).await?;
            println!(
                "Reconciled {}: {} desk(s) moved, {} failed",
                session,
                report.changed(),
                report.failed
            );
        }
        None => println!("Session {} is not running; panes move on the next apply", space.session_name()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(task: &str, assignee: Option<&str>) -> Args {
        Args {
            space: PathBuf::from("space.yaml"),
            task: task.to_string(),
            assignee: assignee.map(String::from),
            branch: None,
            description: None,
            env_files: Vec::new(),
            no_reconcile: true,
        }
    }

    #[test]
    fn resolve_task_uses_declared_task() {
        let mut space = SpaceConfig::new("s");
        let mut declared = TaskConfig::new("api", "org01-pm-r1");
        declared.branch = Some("feature/api".to_string());
        space.tasks.push(declared);

        let task = resolve_task(&space, &args("api", None)).unwrap();
        assert_eq!(task.assignee, "org01-pm-r1");
        assert_eq!(task.branch_name(), "feature/api");

        let overridden = resolve_task(&space, &args("api", Some("org02-pm-r1"))).unwrap();
        assert_eq!(overridden.assignee, "org02-pm-r1", "resolve_task: --assignee overrides");
    }

    #[test]
    fn resolve_task_requires_assignee_for_undeclared_task() {
        let space = SpaceConfig::new("s");
        assert!(resolve_task(&space, &args("new", None)).is_err());
        assert_eq!(
            resolve_task(&space, &args("new", Some("org01-pm-r1"))).unwrap().name,
            "new"
        );
    }

    #[test]
    fn resolve_task_rejects_shared_or_reserved_directory() {
        let mut space = SpaceConfig::new("s");
        space.tasks.push(TaskConfig::new("Login form", "org01-pm-r1"));

        assert!(
            resolve_task(&space, &args("login-form", Some("org02-pm-r1"))).is_err(),
            "resolve_task: ad-hoc task may not reuse a declared task's directory"
        );
        assert!(resolve_task(&space, &args("main", Some("org02-pm-r1"))).is_err());
        assert!(resolve_task(&space, &args("Login form", None)).is_ok());
    }
}
