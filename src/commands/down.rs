use anyhow::{bail, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::{Config, SpaceConfig};

#[derive(ClapArgs)]
pub struct Args {
    /// Session name to stop (default: the session of --space)
    pub session_name: Option<String>,

    /// Space document, used to find the session and its base path
    #[arg(short, long)]
    pub space: Option<PathBuf>,

    /// Also drop the session's room/window mapping (found through --space or
    /// the base path the session was created with)
    #[arg(long)]
    pub purge: bool,
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = args.space.as_deref().map(SpaceConfig::load).transpose()?;

    let session_name = match (&args.session_name, &space) {
        (Some(name), _) => name.clone(),
        (None, Some(space)) => space.session_name(),
        (None, None) => bail!("Pass a session name or --space"),
    };
    let base_path = space.as_ref().map(|s| s.resolved_base_path()).transpose()?;

    println!("Stopping session: {}", session_name);

    let mut controller = common::controller(config);
    let killed = controller
        .teardown(&session_name, base_path.as_deref(), args.purge)
        .await?;

    if killed {
        println!("Session {} stopped successfully", session_name);
    } else {
        println!("Session {} was not running", session_name);
    }
    Ok(())
}
