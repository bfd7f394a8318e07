//! Registry of every known configuration and component, with public ids,
//! dependency tracking, delete safety and snapshot publication.

mod ids;
mod manager;
mod snapshot;

pub use ids::{create_pv_name, COMPONENT_PLACEHOLDER, CONFIG_PLACEHOLDER};
pub use manager::ConfigListManager;
pub use snapshot::{
    ComponentSummary, ConfigSummary, RegistrySnapshot, SnapshotPublisher, SnapshotWatcher,
};
