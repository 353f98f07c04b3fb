use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::{Config, SpaceConfig};
use crate::topology::WindowOutcome;
use crate::utils::Glyph;

#[derive(ClapArgs)]
pub struct Args {
    /// Space document (YAML)
    pub space: PathBuf,

    /// Extra env file merged into every task's .env, after those the space
    /// declares (repeatable)
    #[arg(long = "env", value_name = "FILE")]
    pub env_files: Vec<PathBuf>,
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let mut space = SpaceConfig::load(&args.space)?;
    space.env_files.extend(args.env_files);
    let mut controller = common::controller(config);

    println!("Applying space: {}", space.name);
    let report = controller.create_space(&space).await?;

    println!("Session:   {}", report.session);
    println!("Base path: {}", report.base_path.display());
    println!("Layout:    {:?}", report.strategy);
    if let Some(ready) = report.repository_ready {
        let glyph = if ready { Glyph::Success } else { Glyph::Warn };
        println!("Repository: {}", glyph);
    }

    for window in &report.windows {
        match &window.outcome {
            WindowOutcome::Split(split) if split.is_complete() => {
                println!(
                    "  {} window {} ({}): {} panes",
                    Glyph::Success,
                    window.window,
                    window.room_id,
                    split.pane_count()
                );
            }
            WindowOutcome::Split(split) => {
                println!(
                    "  {} window {} ({}): {} panes, partially split",
                    Glyph::Warn,
                    window.window,
                    window.room_id,
                    split.pane_count()
                );
            }
            WindowOutcome::Failed(reason) => {
                println!(
                    "  {} window {} ({}): {}",
                    Glyph::Error,
                    window.window,
                    window.room_id,
                    reason
                );
            }
        }
    }

    println!(
        "Tasks: {} provisioned, {} failed",
        report.tasks_provisioned, report.tasks_failed
    );
    println!(
        "Desks: {} on task, {} on standby, {} failed, {} without a pane",
        report.reconcile.on_task,
        report.reconcile.on_standby,
        report.reconcile.failed,
        report.reconcile.skipped
    );

    if report.is_complete() {
        println!("{} Space {} is ready", Glyph::Success, report.session);
    } else {
        println!(
            "{} Space {} was created with errors; run 'deskgrid reconcile' to retry pane placement",
            Glyph::Warn,
            report.session
        );
    }
    Ok(())
}
