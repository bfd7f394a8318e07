//! Configuration composition, registry and reconciliation engine for an
//! instrument block server.
//!
//! A configuration bundles blocks, groups and IOCs and may depend on
//! reusable components. This crate composes configurations with their
//! components ([`holder`]), diffs successive active configurations to decide
//! which IOCs to start, restart and stop, keeps a registry of everything on
//! disk ([`registry`]) and folds out-of-band file edits back into it
//! ([`watcher`]). [`service::ConfigServer`] ties these together.
//!
//! Storage, version control, process supervision and the archiver/run-control
//! consumers sit behind the traits in [`ports`].

pub mod config;
pub mod error;
pub mod hooks;
pub mod holder;
pub mod ioc_control;
pub mod ports;
pub mod registry;
pub mod service;
pub mod store;
pub mod watcher;

pub use config::{ServerConfig, VcsBackend};
pub use error::{ConfigError, Result};
pub use holder::{ActiveConfigHolder, ConfigDescription, ConfigDetails, ConfigHolder, IocChanges};
pub use registry::{ConfigListManager, RegistrySnapshot};
pub use service::{ConfigServer, ServerAdapters};
