//! Adapter traits for everything outside the core.
//!
//! The engine only talks to storage, version control, the process supervisor
//! and the downstream consumers through these traits. Concrete adapters are
//! injected at construction.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use config_types::{Block, Configuration, RunControlSettings};

use crate::error::Result;

// ── Persistence ──

/// Reads and writes configurations and components.
pub trait ConfigStore: Send + Sync {
    /// Load `name`. Fails with `NotFound` if it does not exist and
    /// `Validation` if any of its files cannot be parsed.
    fn load(&self, name: &str, is_component: bool) -> Result<Configuration>;

    /// Persist `config` under its own name.
    fn save(&self, config: &Configuration, is_component: bool) -> Result<()>;

    /// Names of every stored configuration (or component).
    fn list(&self, is_component: bool) -> Result<Vec<String>>;

    fn exists(&self, name: &str, is_component: bool) -> bool;

    /// Remove the backing files of `name`. Deleting a missing entry is not an error.
    fn delete(&self, name: &str, is_component: bool) -> Result<()>;

    /// Location handed to version control for `name`.
    fn path_for(&self, name: &str, is_component: bool) -> PathBuf;

    /// Create the reserved default component if it is missing.
    fn ensure_default_component(&self) -> Result<()>;
}

// ── Version control ──

/// Version-control primitives over the configuration tree.
///
/// Callers treat every method as best-effort: failures are logged, never
/// allowed to undo an in-memory change that already succeeded.
pub trait VersionControl: Send + Sync {
    fn add(&self, path: &Path) -> Result<()>;
    fn commit(&self, message: &str) -> Result<()>;
    fn remove(&self, path: &Path) -> Result<()>;
    /// Discard uncommitted working-tree changes, restoring deleted files.
    fn revert_to_head(&self) -> Result<()>;
}

// ── Process lifecycle ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IocState {
    Running,
    Shutdown,
}

impl fmt::Display for IocState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IocState::Running => write!(f, "RUNNING"),
            IocState::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

/// Starts and stops the OS processes behind IOC names.
pub trait ProcessSupervisor: Send + Sync {
    fn start(&self, name: &str) -> Result<()>;
    fn stop(&self, name: &str) -> Result<()>;
    fn restart(&self, name: &str) -> Result<()>;
    fn status(&self, name: &str) -> Result<IocState>;
}

// ── Downstream consumers ──

/// Receives the composed block list whenever archiving must be reconfigured.
pub trait ArchiverSink: Send + Sync {
    /// `block_prefix` is the full PV prefix of block PVs, e.g. `IN:DEMO:CS:SB:`.
    fn update_archiver(&self, block_prefix: &str, blocks: &[Block]) -> Result<()>;
}

/// Live run-control supervision.
pub trait RunControlSink: Send + Sync {
    /// Push the composed block list so limits are (re)applied.
    fn update_runcontrol(&self, blocks: &[Block]) -> Result<()>;

    /// Current live limits keyed by block name, used when saving.
    fn current_settings(&self) -> Result<BTreeMap<String, RunControlSettings>>;
}

/// Suspends and resumes filesystem reconciliation around self-inflicted writes.
pub trait WatcherControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

/// A `WatcherControl` for setups without a filesystem watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWatcher;

impl WatcherControl for NoWatcher {
    fn pause(&self) {}
    fn resume(&self) {}
}
