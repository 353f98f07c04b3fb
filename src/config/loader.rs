use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Any single multiplexer command.
    pub command_secs: u64,
    pub clone_secs: u64,
    pub worktree_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 10,
            clone_secs: 300,
            worktree_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_secs)
    }

    pub fn worktree_timeout(&self) -> Duration {
        Duration::from_secs(self.worktree_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandbyConfig {
    /// Shared directory under the space base path for idle desks.
    pub directory: String,
    /// Word placed in the title of idle panes.
    pub marker: String,
}

impl Default for StandbyConfig {
    fn default() -> Self {
        Self {
            directory: "standby".to_string(),
            marker: "待機中".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timeouts: TimeoutConfig,
    pub standby: StandbyConfig,
    pub metadata_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            standby: StandbyConfig::default(),
            metadata_dir: ".metadata".to_string(),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path.unwrap_or_else(Self::default_config_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn default_config_path() -> PathBuf {
        if let Some(config_path) = std::env::var_os("DESKGRID_CONFIG") {
            PathBuf::from(config_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("deskgrid")
                .join("config.yaml")
        }
    }
}
