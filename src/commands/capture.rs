use anyhow::Result;
use clap::Args as ClapArgs;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::{Config, SpaceConfig};

#[derive(ClapArgs)]
pub struct Args {
    /// Space document (YAML)
    pub space: PathBuf,

    /// Agent id of the desk (e.g., org01-pm-r1)
    pub agent_id: String,

    /// Print only the last N lines
    #[arg(short = 'n', long)]
    pub lines: Option<usize>,
}

/// tmux pads captures with blank lines below the cursor; those are dropped
/// before taking the last `lines`.
fn tail_lines(text: &str, lines: Option<usize>) -> Vec<&str> {
    let mut kept: Vec<&str> = text.lines().collect();
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    match lines {
        Some(n) if n < kept.len() => kept.split_off(kept.len() - n),
        _ => kept,
    }
}

pub async fn execute(args: Args, config: &Config) -> Result<()> {
    let space = SpaceConfig::load(&args.space)?;
    let mut controller = common::controller(config);
    let session = common::attach_running(&mut controller, &space).await?;

    let text = controller.capture_desk(&session, &args.agent_id).await?;
    for line in tail_lines(&text, args.lines) {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_lines_drops_trailing_padding() {
        let text = "one\ntwo\nthree\n\n   \n\n";
        assert_eq!(tail_lines(text, None), vec!["one", "two", "three"]);
        assert_eq!(tail_lines(text, Some(2)), vec!["two", "three"]);
        assert_eq!(tail_lines(text, Some(10)).len(), 3);
        assert!(tail_lines("\n\n", Some(1)).is_empty());
    }
}
