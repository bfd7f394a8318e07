//! Facility-wide names shared by every layer.

/// Group that collects every block not placed in a named group.
pub const GRP_NONE: &str = "NONE";

/// Reserved component implicitly attached to every top-level configuration.
pub const DEFAULT_COMPONENT: &str = "_base";

/// Macro standing in for the instrument PV prefix in local block addresses.
pub const PV_PREFIX_MACRO: &str = "$(MYPVPREFIX)";

/// Prefix for block PVs served by the block gateway.
pub const BLOCK_PREFIX: &str = "CS:SB:";

/// Processes that are never stopped or restarted implicitly.
///
/// Matched as name prefixes, so `INSTETC_01` is covered by `INSTETC`.
pub const IOCS_NOT_TO_STOP: &[&str] = &[
    "INSTETC", "PSCTRL", "ISISDAE", "BLOCKSVR", "ARINST", "ARBLOCK", "GWBLOCK", "RUNCTRL",
];

/// Subdirectory of the configuration root holding top-level configurations.
pub const CONFIG_DIRECTORY: &str = "configurations";

/// Subdirectory of the configuration root holding components.
pub const COMPONENT_DIRECTORY: &str = "components";

/// Returns true if `name` is the reserved default component (case-insensitive).
pub fn is_default_component(name: &str) -> bool {
    name.eq_ignore_ascii_case(DEFAULT_COMPONENT)
}

/// Returns true if `name` is the `NONE` group (case-insensitive).
pub fn is_none_group(name: &str) -> bool {
    name.eq_ignore_ascii_case(GRP_NONE)
}

/// Returns true if `ioc` must not be stopped or restarted without `force`.
pub fn is_protected_ioc(ioc: &str) -> bool {
    let upper = ioc.to_ascii_uppercase();
    IOCS_NOT_TO_STOP
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}
