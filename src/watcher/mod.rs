//! Filesystem reconciliation: notify events from the configuration and
//! component trees are queued and folded back into the registry.

mod events;
mod manager;
mod reconciler;

pub use events::{map_notify_event, WatchEvent, WatchEventKind};
pub use manager::{FileWatcherManager, PauseGuard, PauseSwitch, WatcherStats};
pub use reconciler::{Reconciled, Reconciler};
