mod envfile;
mod git;
#[cfg(test)]
pub mod mock;
mod provision;
mod tmux;

pub use git::{log_soft_failure, GitManager};
pub use provision::{TaskProvisioner, MAIN_CHECKOUT};
pub use tmux::{
    cleanup_existing_session, normalize_base_indices, pin_pane_base_index, set_pane_cwd,
    split_window, Multiplexer, SessionSummary, SplitReport, TmuxManager,
};
