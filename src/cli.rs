use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{apply, assign, assignments, attach, capture, down, layout, reconcile, release};

#[derive(Parser)]
#[command(name = "deskgrid")]
#[command(about = "Desk assignment and tmux session topology controller")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create (or recreate) the session of a space
    Apply(apply::Args),

    /// Move desk panes to match the assignment ledger
    Reconcile(reconcile::Args),

    /// Assign a task to a desk
    Assign(assign::Args),

    /// Release a desk from a task
    Release(release::Args),

    /// Show the task each desk of a space is working on
    Assignments(assignments::Args),

    /// Print the visible output of a desk's pane
    Capture(capture::Args),

    /// List running space sessions with window and pane counts
    Sessions,

    /// Kill a space's session
    Down(down::Args),

    /// Attach to a space's session, optionally at a room
    Attach(attach::Args),

    /// Show the pane layout for a grid and room count
    Layout(layout::Args),
}
