use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::{Config, SpaceConfig};
use crate::utils::Glyph;

#[derive(ClapArgs)]
pub struct Args {
    /// Space document (YAML)
    pub space: PathBuf,
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = SpaceConfig::load(&args.space)?;
    let mut controller = common::controller(config);
    let session = common::attach_running(&mut controller, &space).await?;

    let report = controller.reconcile(&session).await?;

    let glyph = if report.failed == 0 {
        Glyph::Success
    } else {
        Glyph::Warn
    };
    println!(
        "{} {}: {} on task, {} on standby, {} unchanged, {} failed",
        glyph, session, report.on_task, report.on_standby, report.unchanged, report.failed
    );
    if report.skipped > 0 {
        println!("{} {} desks have no pane", Glyph::Warn, report.skipped);
    }
    Ok(())
}
