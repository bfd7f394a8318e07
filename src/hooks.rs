//! Archiver and run-control adapters that do not talk to real services.

use std::collections::BTreeMap;
use std::sync::Mutex;

use config_types::{Block, RunControlSettings};
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::ports::{ArchiverSink, RunControlSink};

/// Logs every update. Run-control reads return no live limits.
#[derive(Debug, Default)]
pub struct TracingHooks;

impl ArchiverSink for TracingHooks {
    fn update_archiver(&self, block_prefix: &str, blocks: &[Block]) -> Result<()> {
        info!(
            block_prefix = %block_prefix,
            blocks = blocks.len(),
            "archiver configuration updated"
        );
        Ok(())
    }
}

impl RunControlSink for TracingHooks {
    fn update_runcontrol(&self, blocks: &[Block]) -> Result<()> {
        let enabled = blocks.iter().filter(|b| b.rc_enabled).count();
        info!(blocks = blocks.len(), enabled, "run-control updated");
        Ok(())
    }

    fn current_settings(&self) -> Result<BTreeMap<String, RunControlSettings>> {
        Ok(BTreeMap::new())
    }
}

/// Records every call for assertions.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    archiver_updates: Mutex<Vec<Vec<String>>>,
    runcontrol_updates: Mutex<Vec<Vec<String>>>,
    live_settings: Mutex<BTreeMap<String, RunControlSettings>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block names passed on each archiver update, oldest first.
    pub fn archiver_updates(&self) -> Vec<Vec<String>> {
        self.archiver_updates
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn runcontrol_updates(&self) -> Vec<Vec<String>> {
        self.runcontrol_updates
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Set the limits `current_settings` reports.
    pub fn set_live_settings(&self, settings: BTreeMap<String, RunControlSettings>) -> Result<()> {
        let mut live = self.live_settings.lock().map_err(ConfigError::lock)?;
        *live = settings;
        Ok(())
    }
}

fn names(blocks: &[Block]) -> Vec<String> {
    blocks.iter().map(|b| b.name.clone()).collect()
}

impl ArchiverSink for RecordingHooks {
    fn update_archiver(&self, _block_prefix: &str, blocks: &[Block]) -> Result<()> {
        self.archiver_updates
            .lock()
            .map_err(ConfigError::lock)?
            .push(names(blocks));
        Ok(())
    }
}

impl RunControlSink for RecordingHooks {
    fn update_runcontrol(&self, blocks: &[Block]) -> Result<()> {
        self.runcontrol_updates
            .lock()
            .map_err(ConfigError::lock)?
            .push(names(blocks));
        Ok(())
    }

    fn current_settings(&self) -> Result<BTreeMap<String, RunControlSettings>> {
        Ok(self.live_settings.lock().map_err(ConfigError::lock)?.clone())
    }
}
