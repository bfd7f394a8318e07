use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use config_types::constants::{is_default_component, is_none_group, DEFAULT_COMPONENT, GRP_NONE};
use config_types::{
    Block, Configuration, Group, Ioc, MetaData, Named, NamedList, RunControlSettings,
};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::holder::description::{ComponentRef, ConfigDescription, ConfigDetails};
use crate::ports::{ConfigStore, VersionControl};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").unwrap());

/// Holds one configuration plus its attached components and answers what the
/// composed configuration looks like.
///
/// Composition rules:
/// - blocks and IOCs: native entries win, then the first attached component
///   that defines the name; later duplicates are dropped
/// - groups: native groups first, then component groups, first claim on a
///   block wins; groups left with no blocks are dropped
/// - every composed block not claimed by a named group is listed in `NONE`,
///   which comes last and only appears when it has blocks
#[derive(Clone)]
pub struct ConfigHolder {
    config: Configuration,
    components: NamedList<Configuration>,
    is_component: bool,
    pv_prefix: String,
    store: Arc<dyn ConfigStore>,
    vcs: Arc<dyn VersionControl>,
    cached_config: Configuration,
    cached_components: NamedList<Configuration>,
}

impl ConfigHolder {
    pub fn new(
        pv_prefix: impl Into<String>,
        store: Arc<dyn ConfigStore>,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            config: Configuration::default(),
            components: NamedList::new(),
            is_component: false,
            pv_prefix: pv_prefix.into(),
            store,
            vcs,
            cached_config: Configuration::default(),
            cached_components: NamedList::new(),
        }
    }

    pub fn clear_config(&mut self) {
        self.config = Configuration::default();
        self.components = NamedList::new();
        self.is_component = false;
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn is_component(&self) -> bool {
        self.is_component
    }

    pub fn pv_prefix(&self) -> &str {
        &self.pv_prefix
    }

    /// The native configuration, without anything contributed by components.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn meta(&self) -> &MetaData {
        &self.config.meta
    }

    pub fn history(&self) -> &[String] {
        &self.config.meta.history
    }

    pub fn set_history(&mut self, history: Vec<String>) {
        self.config.meta.history = history;
    }

    // ── Components ──

    pub fn add_component(&mut self, name: &str, mut component: Configuration) -> Result<()> {
        if self.is_component {
            return Err(ConfigError::InvalidOperation(
                "Can not add a component to a component".to_string(),
            ));
        }
        if self.components.contains(name) {
            return Err(ConfigError::Duplicate(format!(
                "Requested component is already part of the configuration: {}",
                name
            )));
        }

        component.set_name(name);
        component.set_owner(name);
        component.is_component = true;
        if !is_default_component(name) && !self.config.has_component(name) {
            self.config.add_component(name)?;
        }
        self.components.insert(component);
        Ok(())
    }

    pub fn remove_component(&mut self, name: &str) -> Result<()> {
        if self.is_component {
            return Err(ConfigError::InvalidOperation(
                "Can not remove a component from a component".to_string(),
            ));
        }
        self.components
            .remove(name)
            .ok_or_else(|| ConfigError::NotFound(format!("component {}", name)))?;
        self.config.remove_component(name);
        Ok(())
    }

    /// Names of attached components in attach order.
    pub fn component_names(&self, include_default: bool) -> Vec<String> {
        self.components
            .iter()
            .map(|c| c.meta.name.clone())
            .filter(|name| include_default || !is_default_component(name))
            .collect()
    }

    pub(crate) fn components(&self) -> &NamedList<Configuration> {
        &self.components
    }

    // ── Composed views ──

    pub fn blocks(&self) -> NamedList<Block> {
        let mut blocks = self.config.blocks.clone();
        for component in &self.components {
            for block in &component.blocks {
                if !blocks.insert_new(block.clone()) {
                    debug!(
                        block = %block.name,
                        component = %component.meta.name,
                        "block already defined, component entry dropped"
                    );
                }
            }
        }
        blocks
    }

    pub fn block_names(&self) -> Vec<String> {
        self.blocks().names()
    }

    pub fn groups(&self) -> NamedList<Group> {
        let blocks = self.blocks();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut groups: NamedList<Group> = NamedList::new();

        let mut claim = |group: &mut Group, requested: &[String]| {
            for name in requested {
                let Some(block) = blocks.get(name) else {
                    continue;
                };
                if claimed.insert(block.name.to_ascii_lowercase()) {
                    group.blocks.push(block.name.clone());
                }
            }
        };

        for native in self.config.groups.iter().filter(|g| !is_none_group(&g.name)) {
            let mut group = Group {
                blocks: Vec::new(),
                ..native.clone()
            };
            claim(&mut group, &native.blocks);
            groups.insert(group);
        }

        for component in &self.components {
            for comp_group in component.groups.iter().filter(|g| !is_none_group(&g.name)) {
                match groups.get_mut(&comp_group.name) {
                    Some(existing) => claim(existing, &comp_group.blocks),
                    None => {
                        let mut group = Group {
                            blocks: Vec::new(),
                            ..comp_group.clone()
                        };
                        claim(&mut group, &comp_group.blocks);
                        groups.insert(group);
                    }
                }
            }
        }

        let orphans: Vec<String> = blocks
            .iter()
            .filter(|b| !claimed.contains(&b.name.to_ascii_lowercase()))
            .map(|b| b.name.clone())
            .collect();

        let mut composed: NamedList<Group> = groups
            .into_iter()
            .filter(|g| !g.blocks.is_empty())
            .collect();
        if !orphans.is_empty() {
            composed.insert(Group::new(GRP_NONE).with_blocks(orphans));
        }
        composed
    }

    pub fn iocs(&self) -> NamedList<Ioc> {
        compose_iocs(&self.config, &self.components)
    }

    // ── Mutation ──

    /// Add a native block, stripping the instrument prefix from local PVs.
    pub fn add_block(&mut self, mut block: Block, group: Option<&str>) -> Result<()> {
        if block.local && !self.pv_prefix.is_empty() {
            if let Some(stripped) = block.pv.strip_prefix(self.pv_prefix.as_str()) {
                block.pv = stripped.to_string();
            }
        }
        self.config.add_block(block, group.unwrap_or(GRP_NONE))?;
        Ok(())
    }

    pub fn add_ioc(&mut self, ioc: Ioc) -> bool {
        self.config.add_ioc(ioc)
    }

    /// Redefine native groups from a client request.
    ///
    /// Only blocks in the composed view that are not yet placed by an earlier
    /// requested group are accepted. A requested group that already exists
    /// natively is rewritten, or removed if the request lists no blocks. A
    /// requested group that does not exist natively is created only if the
    /// request lists blocks; a requested component group with no blocks is
    /// therefore dropped while one with blocks becomes native. Whatever is
    /// left unplaced becomes the native `NONE` group.
    pub fn set_group_details(&mut self, requested: &[Group]) {
        let mut homeless = self.block_names();

        let mut take = |wanted: &str| -> Option<String> {
            let idx = homeless.iter().position(|b| b.eq_ignore_ascii_case(wanted))?;
            Some(homeless.remove(idx))
        };

        for grp in requested {
            if is_none_group(&grp.name) {
                continue;
            }
            if self.config.groups.contains(&grp.name) {
                if grp.blocks.is_empty() {
                    self.config.groups.remove(&grp.name);
                    continue;
                }
                let placed: Vec<String> = grp.blocks.iter().filter_map(|b| take(b)).collect();
                if let Some(existing) = self.config.groups.get_mut(&grp.name) {
                    existing.blocks = placed;
                }
            } else if !grp.blocks.is_empty() {
                let placed: Vec<String> = grp.blocks.iter().filter_map(|b| take(b)).collect();
                self.config
                    .groups
                    .insert(Group::new(grp.name.clone()).with_blocks(placed));
            }
        }

        match self.config.groups.get_mut(GRP_NONE) {
            Some(none) => none.blocks = homeless,
            None => {
                self.config
                    .groups
                    .insert(Group::new(GRP_NONE).with_blocks(homeless));
            }
        }
    }

    pub fn update_runcontrol_settings_for_saving(
        &mut self,
        settings: &BTreeMap<String, RunControlSettings>,
    ) {
        self.config.update_runcontrol_settings_for_saving(settings);
    }

    /// Replace the contents from a client description.
    ///
    /// Either the whole description applies or, on error, the holder is left
    /// exactly as it was before the call.
    pub fn set_details_from_description(&mut self, desc: &ConfigDescription) -> Result<()> {
        self.cache();
        if let Err(e) = self.apply_description(desc) {
            self.restore_cache();
            return Err(e);
        }
        Ok(())
    }

    fn apply_description(&mut self, desc: &ConfigDescription) -> Result<()> {
        self.clear_config();

        for ioc in &desc.iocs {
            if ioc.component.is_some() {
                return Err(ConfigError::Validation(
                    "Cannot override iocs from components".to_string(),
                ));
            }
            self.add_ioc(ioc.clone());
        }

        for entry in &desc.blocks {
            if entry.block.component.is_some() {
                return Err(ConfigError::Validation(
                    "Cannot override blocks from components".to_string(),
                ));
            }
            self.add_block(entry.block.clone(), entry.group.as_deref())?;
        }

        if desc.groups.iter().any(|g| g.component.is_some()) {
            return Err(ConfigError::Validation(
                "Cannot override groups from components".to_string(),
            ));
        }
        if !desc.groups.is_empty() {
            self.set_group_details(&desc.groups);
        }

        if let Some(name) = &desc.name {
            self.config.set_name(name.clone());
        }
        if let Some(description) = &desc.description {
            self.config.meta.description = description.clone();
        }
        if let Some(synoptic) = &desc.synoptic {
            self.config.meta.synoptic = synoptic.clone();
        }
        if let Some(history) = &desc.history {
            self.config.meta.history = history.clone();
        }

        for ComponentRef { name } in &desc.components {
            let component = self.load_configuration(name, true)?;
            let name = component.meta.name.clone();
            self.add_component(&name, component)?;
        }
        Ok(())
    }

    // ── Caching ──

    pub(crate) fn cache(&mut self) {
        self.cached_config = self.config.clone();
        self.cached_components = self.components.clone();
    }

    pub(crate) fn restore_cache(&mut self) {
        self.config = self.cached_config.clone();
        self.components = self.cached_components.clone();
    }

    pub(crate) fn cached_config(&self) -> &Configuration {
        &self.cached_config
    }

    pub(crate) fn cached_components(&self) -> &NamedList<Configuration> {
        &self.cached_components
    }

    // ── Persistence ──

    /// Load `name` from the store without attaching it.
    ///
    /// Components come back with every entry tagged as owned by `name`.
    pub fn load_configuration(&self, name: &str, is_component: bool) -> Result<Configuration> {
        let mut config = self.store.load(name, is_component)?;
        if is_component {
            config.set_owner(name);
        }
        Ok(config)
    }

    /// Load `name` and every component it depends on.
    pub fn load(&mut self, name: &str, is_component: bool) -> Result<()> {
        let config = self.load_configuration(name, is_component)?;
        self.set_config(config, is_component)
    }

    /// Replace the held configuration.
    ///
    /// Top-level configurations get their declared components and the default
    /// component attached. Every component is loaded before anything is
    /// replaced, so a missing component leaves the holder untouched.
    pub fn set_config(&mut self, config: Configuration, is_component: bool) -> Result<()> {
        let mut staged: Vec<(String, Configuration)> = Vec::new();
        if !is_component {
            for name in config
                .components
                .iter()
                .filter(|name| !is_default_component(name))
            {
                staged.push((name.clone(), self.load_configuration(name, true)?));
            }
            let base = self.load_configuration(DEFAULT_COMPONENT, true)?;
            staged.push((DEFAULT_COMPONENT.to_string(), base));
        }

        self.clear_config();
        self.config = config;
        self.config.is_component = is_component;
        self.is_component = is_component;
        for (name, component) in staged {
            self.add_component(&name, component)?;
        }
        Ok(())
    }

    /// Validate `name`, then persist under it and commit to version control.
    ///
    /// Saving a configuration as a component is refused while it has
    /// non-default components attached; the default component is detached.
    /// The holder only changes once the store has accepted the write.
    pub fn save(&mut self, name: &str, as_component: bool) -> Result<()> {
        check_name(name, as_component)?;
        let casting = as_component && !self.is_component;
        if casting
            && self
                .components
                .iter()
                .any(|c| !is_default_component(&c.meta.name))
        {
            return Err(ConfigError::InvalidOperation(
                "Can not cast to a component as the configuration contains at least one component"
                    .to_string(),
            ));
        }

        let mut config = self.config.clone();
        config.is_component = as_component;
        if casting {
            config.components.clear();
        }
        config.set_name(name);
        config.meta.record_edit(Utc::now());
        self.store.save(&config, as_component)?;

        self.config = config;
        self.is_component = as_component;
        if casting {
            self.components.remove(DEFAULT_COMPONENT);
        }
        self.update_version_control(name);
        Ok(())
    }

    fn update_version_control(&self, name: &str) {
        let path = self.store.path_for(name, self.is_component);
        if let Err(e) = self.vcs.add(&path) {
            warn!(name = %name, error = %e, "unable to add to version control");
        }
        if let Err(e) = self.vcs.commit(&format!("{} modified by client", name)) {
            warn!(name = %name, error = %e, "unable to commit to version control");
        }
    }

    // ── Views ──

    pub fn config_details(&self) -> ConfigDetails {
        let blocks = self
            .blocks()
            .into_iter()
            .map(|mut block| {
                block.pv = block.expanded_pv(&self.pv_prefix);
                block
            })
            .collect();

        ConfigDetails {
            name: self.config.meta.name.clone(),
            description: self.config.meta.description.clone(),
            synoptic: self.config.meta.synoptic.clone(),
            history: self.config.meta.history.clone(),
            blocks,
            groups: self.groups().into_vec(),
            iocs: self.config.iocs.iter().cloned().collect(),
            component_iocs: self.iocs().into_vec(),
            components: self
                .component_names(false)
                .into_iter()
                .map(ComponentRef::new)
                .collect(),
        }
    }
}

/// Native IOCs, then those of each component in attach order that are not
/// defined yet. Component entries keep their owner tag.
pub(crate) fn compose_iocs(
    config: &Configuration,
    components: &NamedList<Configuration>,
) -> NamedList<Ioc> {
    let mut iocs = config.iocs.clone();
    for component in components {
        for ioc in &component.iocs {
            if !iocs.insert_new(ioc.clone()) {
                debug!(
                    ioc = %ioc.name,
                    component = %component.meta.name,
                    "IOC already defined, component entry dropped"
                );
            }
        }
    }
    iocs
}

/// Names must start with a letter and contain only letters, digits and `_`.
/// The default component name is reserved.
pub fn check_name(name: &str, as_component: bool) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "Configuration name cannot be blank".to_string(),
        ));
    }
    if as_component && is_default_component(name) {
        return Err(ConfigError::Validation(
            "Cannot save over default component".to_string(),
        ));
    }
    if !NAME_RE.is_match(name) {
        return Err(ConfigError::Validation(
            "Configuration name contains invalid characters".to_string(),
        ));
    }
    Ok(())
}
