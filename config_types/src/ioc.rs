use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::named::Named;

/// Simulation level an IOC is started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimLevel {
    #[default]
    None,
    Recsim,
    Devsim,
}

impl SimLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimLevel::None => "none",
            SimLevel::Recsim => "recsim",
            SimLevel::Devsim => "devsim",
        }
    }

    /// Parses a level case-insensitively; unknown values fall back to `None`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "recsim" => SimLevel::Recsim,
            "devsim" => SimLevel::Devsim,
            _ => SimLevel::None,
        }
    }
}

/// A controlled process descriptor.
///
/// Map-valued fields are `BTreeMap`s, so equality is independent of the order
/// the entries were declared in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ioc {
    pub name: String,
    #[serde(default = "default_true")]
    pub autostart: bool,
    /// Restart on crash.
    #[serde(default = "default_true")]
    pub restart: bool,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
    /// Value overrides applied to the IOC's PVs at start-up.
    #[serde(default)]
    pub pvs: BTreeMap<String, String>,
    /// PV sets and whether each is enabled.
    #[serde(default)]
    pub pvsets: BTreeMap<String, bool>,
    #[serde(default)]
    pub simlevel: SimLevel,
}

fn default_true() -> bool {
    true
}

impl Ioc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            autostart: true,
            restart: true,
            component: None,
            macros: BTreeMap::new(),
            pvs: BTreeMap::new(),
            pvsets: BTreeMap::new(),
            simlevel: SimLevel::None,
        }
    }

    pub fn with_macro(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.insert(name.into(), value.into());
        self
    }

    pub fn with_pv(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pvs.insert(name.into(), value.into());
        self
    }

    pub fn with_pvset(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.pvsets.insert(name.into(), enabled);
        self
    }

    pub fn with_simlevel(mut self, simlevel: SimLevel) -> Self {
        self.simlevel = simlevel;
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// True when a running instance must be restarted to pick up `other`.
    ///
    /// Compares macros, PV overrides, PV sets, simulation level and the
    /// restart-on-crash flag. `autostart` and ownership are not compared.
    pub fn needs_restart_for(&self, other: &Ioc) -> bool {
        self.macros != other.macros
            || self.pvs != other.pvs
            || self.pvsets != other.pvsets
            || self.simlevel != other.simlevel
            || self.restart != other.restart
    }
}

impl Named for Ioc {
    fn name(&self) -> &str {
        &self.name
    }
}
