use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::holder::ConfigDetails;

/// Registry listing entry for one configuration or component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub name: String,
    pub public_id: String,
    pub description: String,
    pub synoptic: String,
    pub history: Vec<String>,
}

/// A component listing entry with the configurations that use it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    #[serde(flatten)]
    pub summary: ConfigSummary,
    pub dependents: Vec<String>,
}

/// Complete registry state as seen by pollers.
///
/// Details are keyed by public id. The default component is never listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Incremented on every publication.
    pub version: u64,
    pub configs: Vec<ConfigSummary>,
    pub components: Vec<ComponentSummary>,
    pub active_config: String,
    /// The active configuration or one of its components changed on disk
    /// since it was last loaded.
    pub active_config_changed: bool,
    pub config_details: BTreeMap<String, ConfigDetails>,
    pub component_details: BTreeMap<String, ConfigDetails>,
}

impl RegistrySnapshot {
    pub fn config(&self, name: &str) -> Option<&ConfigSummary> {
        self.configs
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSummary> {
        self.components
            .iter()
            .find(|c| c.summary.name.eq_ignore_ascii_case(name))
    }
}

/// Latest-value channel for registry snapshots.
///
/// Receivers always see the most recent snapshot; intermediate ones may be
/// skipped.
pub type SnapshotWatcher = watch::Receiver<RegistrySnapshot>;

#[derive(Debug)]
pub struct SnapshotPublisher {
    sender: watch::Sender<RegistrySnapshot>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (sender, _rx) = watch::channel(RegistrySnapshot::default());
        Self { sender }
    }

    pub fn publish(&self, snapshot: RegistrySnapshot) {
        self.sender.send_replace(snapshot);
    }

    pub fn subscribe(&self) -> SnapshotWatcher {
        self.sender.subscribe()
    }

    pub fn current(&self) -> RegistrySnapshot {
        self.sender.borrow().clone()
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_latest_snapshot() {
        let publisher = SnapshotPublisher::new();
        let rx = publisher.subscribe();
        publisher.publish(RegistrySnapshot {
            version: 1,
            ..Default::default()
        });
        publisher.publish(RegistrySnapshot {
            version: 2,
            active_config: "TEST".to_string(),
            ..Default::default()
        });

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().version, 2);
        assert_eq!(publisher.current().active_config, "TEST");
    }
}
