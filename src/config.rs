//! Server configuration.
//!
//! Settings come from the environment (optionally seeded from a `.env` file):
//!
//!   BLOCKSERVER_CONFIG_ROOT      - directory holding `configurations/` and `components/`
//!   BLOCKSERVER_PV_PREFIX        - instrument PV prefix substituted for `$(MYPVPREFIX)`
//!   BLOCKSERVER_LAST_CONFIG_FILE - file remembering the last active configuration
//!   BLOCKSERVER_WATCH_BUFFER     - capacity of the watcher event channel (default: 1024)
//!   BLOCKSERVER_VCS              - `git` (default) or `none`
//!   BLOCKSERVER_IOC_COMMAND      - external command used to start/stop/restart IOCs

use std::path::PathBuf;

use config_types::constants::{COMPONENT_DIRECTORY, CONFIG_DIRECTORY};

use crate::error::{ConfigError, Result};

const LAST_CONFIG_FILE_NAME: &str = "last_config.txt";

/// Which version-control adapter to wire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsBackend {
    Git,
    None,
}

impl VcsBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "none" | "off" | "" => Ok(Self::None),
            other => Err(ConfigError::Validation(format!(
                "unknown version control backend: {}",
                other
            ))),
        }
    }
}

/// Configuration for the config server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root of the configuration tree.
    pub config_root: PathBuf,

    /// Instrument PV prefix, e.g. `IN:DEMO:`.
    pub pv_prefix: String,

    /// Overrides the default `<config_root>/last_config.txt`.
    pub last_config_file: Option<PathBuf>,

    /// Capacity of the bounded channel between watcher threads and the reconciler.
    pub watch_buffer: usize,

    pub vcs: VcsBackend,

    /// Command invoked as `<command> <start|stop|restart|status> <ioc>`.
    pub ioc_command: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from("settings"),
            pv_prefix: String::new(),
            last_config_file: None,
            watch_buffer: 1024,
            vcs: VcsBackend::Git,
            ioc_command: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(root) = lookup("BLOCKSERVER_CONFIG_ROOT") {
            config.config_root = PathBuf::from(root);
        }
        if let Some(prefix) = lookup("BLOCKSERVER_PV_PREFIX") {
            config.pv_prefix = prefix;
        }
        config.last_config_file = lookup("BLOCKSERVER_LAST_CONFIG_FILE").map(PathBuf::from);
        if let Some(buffer) = lookup("BLOCKSERVER_WATCH_BUFFER") {
            config.watch_buffer = buffer.parse().map_err(|_| {
                ConfigError::Validation(format!("BLOCKSERVER_WATCH_BUFFER is not a number: {}", buffer))
            })?;
        }
        if let Some(vcs) = lookup("BLOCKSERVER_VCS") {
            config.vcs = VcsBackend::parse(&vcs)?;
        }
        config.ioc_command = lookup("BLOCKSERVER_IOC_COMMAND").filter(|c| !c.trim().is_empty());

        Ok(config)
    }

    /// Set the configuration root.
    pub fn config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = root.into();
        self
    }

    /// Set the PV prefix.
    pub fn pv_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pv_prefix = prefix.into();
        self
    }

    /// Set the watcher channel capacity.
    pub fn watch_buffer(mut self, size: usize) -> Self {
        self.watch_buffer = size;
        self
    }

    pub fn vcs(mut self, vcs: VcsBackend) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_root.join(CONFIG_DIRECTORY)
    }

    pub fn component_dir(&self) -> PathBuf {
        self.config_root.join(COMPONENT_DIRECTORY)
    }

    pub fn last_config_path(&self) -> PathBuf {
        self.last_config_file
            .clone()
            .unwrap_or_else(|| self.config_root.join(LAST_CONFIG_FILE_NAME))
    }
}
