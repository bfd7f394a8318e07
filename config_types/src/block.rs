use serde::{Deserialize, Serialize};

use crate::constants::PV_PREFIX_MACRO;
use crate::named::Named;

/// A named alias for a monitored variable.
///
/// Serialized field names follow the facility's client protocol
/// (`runcontrol`, `lowlimit`, `highlimit`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,

    /// Source PV. For local blocks this is stored without the instrument prefix.
    pub pv: String,

    /// Whether the instrument PV prefix must be prepended to `pv`.
    #[serde(default = "default_true")]
    pub local: bool,

    #[serde(default = "default_true")]
    pub visible: bool,

    /// Owning component, `None` when native to the configuration.
    #[serde(default)]
    pub component: Option<String>,

    #[serde(default, rename = "runcontrol")]
    pub rc_enabled: bool,

    #[serde(default, rename = "lowlimit")]
    pub rc_low_limit: Option<f64>,

    #[serde(default, rename = "highlimit")]
    pub rc_high_limit: Option<f64>,

    #[serde(default)]
    pub suspend_on_invalid: bool,

    #[serde(default)]
    pub log_periodic: bool,

    /// Seconds between periodic archive samples.
    #[serde(default = "default_log_rate")]
    pub log_rate: f64,

    #[serde(default)]
    pub log_deadband: f64,
}

/// Live run-control limits for one block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunControlSettings {
    pub enabled: bool,
    pub low_limit: Option<f64>,
    pub high_limit: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_log_rate() -> f64 {
    5.0
}

impl Block {
    /// A visible, local block with run-control off and default logging.
    pub fn new(name: impl Into<String>, pv: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pv: pv.into(),
            local: true,
            visible: true,
            component: None,
            rc_enabled: false,
            rc_low_limit: None,
            rc_high_limit: None,
            suspend_on_invalid: false,
            log_periodic: false,
            log_rate: default_log_rate(),
            log_deadband: 0.0,
        }
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_runcontrol(mut self, low: f64, high: f64) -> Self {
        self.rc_enabled = true;
        self.rc_low_limit = Some(low);
        self.rc_high_limit = Some(high);
        self
    }

    /// The PV with the prefix macro applied when the block is local.
    pub fn macro_pv(&self) -> String {
        if self.local && !self.pv.starts_with(PV_PREFIX_MACRO) {
            format!("{}{}", PV_PREFIX_MACRO, self.pv)
        } else {
            self.pv.clone()
        }
    }

    /// The PV with the prefix macro replaced by the instrument prefix.
    pub fn expanded_pv(&self, pv_prefix: &str) -> String {
        self.macro_pv().replace(PV_PREFIX_MACRO, pv_prefix)
    }

    pub fn runcontrol(&self) -> RunControlSettings {
        RunControlSettings {
            enabled: self.rc_enabled,
            low_limit: self.rc_low_limit,
            high_limit: self.rc_high_limit,
        }
    }

    pub fn apply_runcontrol(&mut self, settings: RunControlSettings) {
        self.rc_enabled = settings.enabled;
        self.rc_low_limit = settings.low_limit;
        self.rc_high_limit = settings.high_limit;
    }
}

impl Named for Block {
    fn name(&self) -> &str {
        &self.name
    }
}
