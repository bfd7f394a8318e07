use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HISTORY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Descriptive data for a configuration or component.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Default synoptic view shown when the configuration is active.
    #[serde(default)]
    pub synoptic: String,
    /// Save timestamps, oldest first. Append-only.
    #[serde(default)]
    pub history: Vec<String>,
}

impl MetaData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record a save at `at`, formatted `YYYY-MM-DD HH:MM:SS`.
    pub fn record_edit(&mut self, at: DateTime<Utc>) {
        self.history.push(at.format(HISTORY_FORMAT).to_string());
    }
}
