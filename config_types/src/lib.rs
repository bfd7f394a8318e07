//! Configuration Types - Level 1 Foundation Types
//!
//! This crate contains the pure data structures that describe an instrument
//! configuration. Everything else in the workspace builds on it; it depends on
//! nothing else in the workspace.
//!
//! ## Contents
//!
//! - [`Block`] - a named alias for a monitored variable
//! - [`Group`] - an ordered, named collection of block names
//! - [`Ioc`] - a controlled process descriptor
//! - [`MetaData`] - name, description, synoptic and edit history
//! - [`Configuration`] - the aggregate, also used for components
//! - [`NamedList`] - the ordered, case-insensitive container all of the above live in
//!
//! ## Rules
//!
//! 1. **NO I/O** - loading and saving belong to the persistence adapter
//! 2. **INVARIANTS ONLY** - the only logic here is what keeps a single
//!    configuration consistent (unique names, group placement)
//! 3. **SERIALIZABLE** - all types support serde
//! 4. **VALUE SEMANTICS** - `Clone` is a full deep copy; rollback caches rely on it

mod block;
mod configuration;
pub mod constants;
mod error;
mod group;
mod ioc;
mod metadata;
mod named;

pub use block::{Block, RunControlSettings};
pub use configuration::Configuration;
pub use error::ModelError;
pub use group::Group;
pub use ioc::{Ioc, SimLevel};
pub use metadata::MetaData;
pub use named::{Named, NamedList};
