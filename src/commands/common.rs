use anyhow::{bail, Result};

use crate::config::{Config, SpaceConfig};
use crate::session::TmuxManager;
use crate::topology::TopologyController;

pub fn controller(config: &Config) -> TopologyController<TmuxManager> {
    let tmux = TmuxManager::new(config.timeouts.command_timeout());
    TopologyController::new(tmux, config.clone())
}

/// Registers a running session with a fresh controller. Fails when the
/// session does not exist.
pub async fn attach_running(
    controller: &mut TopologyController<TmuxManager>,
    space: &SpaceConfig,
) -> Result<String> {
    let session = space.session_name();
    if !controller.rebuild(space).await? {
        bail!(
            "Session {} is not running. Run 'deskgrid apply' first.",
            session
        );
    }
    Ok(session)
}

/// Same as `attach_running`, but a missing session is not an error.
pub async fn attach_if_running(
    controller: &mut TopologyController<TmuxManager>,
    space: &SpaceConfig,
) -> Result<Option<String>> {
    if controller.rebuild(space).await? {
        Ok(Some(space.session_name()))
    } else {
        Ok(None)
    }
}
