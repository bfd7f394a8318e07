//! Persistence and version-control adapters.

mod file_store;
mod memory;
mod vcs;

pub use file_store::FileConfigStore;
pub use memory::MemoryConfigStore;
pub use vcs::{GitVersionControl, MemoryVersionControl, NullVersionControl, VcsOp};
