use config_types::{Block, Group, Ioc};
use serde::{Deserialize, Serialize};

/// Reference to a component by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
}

impl ComponentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A block as sent by a client, with the group it should be placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescription {
    #[serde(flatten)]
    pub block: Block,
    #[serde(default)]
    pub group: Option<String>,
}

impl BlockDescription {
    pub fn new(block: Block, group: impl Into<String>) -> Self {
        Self {
            block,
            group: Some(group.into()),
        }
    }
}

/// Client-supplied replacement for a configuration's contents.
///
/// Absent fields leave the corresponding value at its cleared default.
/// Entries tagged with a `component` are rejected: clients may not redefine
/// what a component provides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDescription {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub synoptic: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<String>>,
    #[serde(default)]
    pub blocks: Vec<BlockDescription>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub iocs: Vec<Ioc>,
    #[serde(default)]
    pub components: Vec<ComponentRef>,
}

impl ConfigDescription {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Everything a client needs to display a configuration.
///
/// Blocks carry expanded PVs; groups list `NONE` last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDetails {
    pub name: String,
    pub description: String,
    pub synoptic: String,
    pub history: Vec<String>,
    pub blocks: Vec<Block>,
    pub groups: Vec<Group>,
    /// IOCs native to the configuration.
    pub iocs: Vec<Ioc>,
    /// IOCs of the composed view, native and component.
    pub component_iocs: Vec<Ioc>,
    /// Attached components, excluding the default component.
    pub components: Vec<ComponentRef>,
}
