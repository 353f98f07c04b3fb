use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::{Config, SpaceConfig};
use crate::session::TmuxManager;

#[derive(ClapArgs)]
pub struct Args {
    /// Space document (YAML)
    pub space: PathBuf,

    /// Room id whose window is selected before attaching
    #[arg(short, long)]
    pub room: Option<String>,
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = SpaceConfig::load(&args.space)?;
    let mut controller = common::controller(config);
    let session = common::attach_running(&mut controller, &space).await?;

    if let Some(room) = &args.room {
        let window = controller.switch_to_room(&space, room).await?;
        println!("Room {} is window {}", room, window);
    }

    TmuxManager::new(config.timeouts.command_timeout())
        .attach(&session)
        .await
}
