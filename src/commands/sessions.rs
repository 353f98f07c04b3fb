use anyhow::Result;

use crate::commands::common;
use crate::config::Config;
use crate::utils::{pad_display, truncate_str};

pub async fn execute(config: &Config) -> Result<()> {
    let controller = common::controller(config);
    let spaces = controller.list_spaces().await?;

    if spaces.is_empty() {
        println!("No deskgrid sessions running.");
        return Ok(());
    }

    println!(
        "{:<24} {:<16} {:>8} {:>6}  {}",
        "SESSION", "SPACE", "WINDOWS", "PANES", "ROOMS"
    );
    println!("{}", "-".repeat(90));

    for space in spaces {
        let rooms = space
            .windows
            .iter()
            .map(|w| format!("{}:{}", w.index, w.name))
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "{} {} {:>8} {:>6}  {}",
            pad_display(&truncate_str(&space.name, 24), 24),
            pad_display(&truncate_str(&space.space, 16), 16),
            space.windows.len(),
            space.pane_count(),
            truncate_str(&rooms, 40)
        );
    }

    Ok(())
}
