use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use config_types::constants::is_default_component;
use config_types::MetaData;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, Result};
use crate::holder::{ConfigDetails, ConfigHolder};
use crate::ports::{ConfigStore, VersionControl};
use crate::registry::ids::{IdAllocator, COMPONENT_PLACEHOLDER, CONFIG_PLACEHOLDER};
use crate::registry::snapshot::{
    ComponentSummary, ConfigSummary, RegistrySnapshot, SnapshotPublisher, SnapshotWatcher,
};

#[derive(Debug, Clone)]
struct Entry {
    meta: MetaData,
    public_id: String,
    details: ConfigDetails,
}

impl Entry {
    fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            name: self.meta.name.clone(),
            public_id: self.public_id.clone(),
            description: self.meta.description.clone(),
            synoptic: self.meta.synoptic.clone(),
            history: self.meta.history.clone(),
        }
    }
}

/// Everything the registry knows. Only touched under the manager's lock.
///
/// Maps are keyed by lower-cased name.
#[derive(Debug)]
struct RegistryState {
    configs: BTreeMap<String, Entry>,
    components: BTreeMap<String, Entry>,
    config_ids: IdAllocator,
    component_ids: IdAllocator,
    /// Component -> configurations that declare it.
    dependencies: BTreeMap<String, Vec<String>>,
    active_config: String,
    active_components: Vec<String>,
    active_changed: bool,
    version: u64,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            configs: BTreeMap::new(),
            components: BTreeMap::new(),
            config_ids: IdAllocator::new(CONFIG_PLACEHOLDER),
            component_ids: IdAllocator::new(COMPONENT_PLACEHOLDER),
            dependencies: BTreeMap::new(),
            active_config: String::new(),
            active_components: Vec::new(),
            active_changed: false,
            version: 0,
        }
    }

    fn dependents(&self, component: &str) -> Vec<String> {
        self.dependencies
            .get(&component.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn remove_config_from_dependencies(&mut self, config: &str) {
        for dependents in self.dependencies.values_mut() {
            dependents.retain(|d| !d.eq_ignore_ascii_case(config));
        }
    }

    fn is_active(&self, name: &str, is_component: bool) -> bool {
        if is_component {
            self.active_components
                .iter()
                .any(|c| c.eq_ignore_ascii_case(name))
        } else {
            !self.active_config.is_empty() && self.active_config.eq_ignore_ascii_case(name)
        }
    }

    /// Add or replace the listing for `holder`'s configuration.
    fn register(&mut self, holder: &ConfigHolder, is_component: bool) {
        let name = holder.name().to_string();
        let key = name.to_ascii_lowercase();

        if is_component {
            if is_default_component(&name) {
                return;
            }
            let public_id = self.component_ids.id_for(&name);
            self.components.insert(
                key,
                Entry {
                    meta: holder.meta().clone(),
                    public_id,
                    details: holder.config_details(),
                },
            );
            return;
        }

        if self.configs.contains_key(&key) {
            self.remove_config_from_dependencies(&name);
        }
        let public_id = self.config_ids.id_for(&name);
        self.configs.insert(
            key,
            Entry {
                meta: holder.meta().clone(),
                public_id,
                details: holder.config_details(),
            },
        );

        for component in holder.component_names(false) {
            let dependents = self
                .dependencies
                .entry(component.to_ascii_lowercase())
                .or_default();
            if !dependents.iter().any(|d| d.eq_ignore_ascii_case(&name)) {
                dependents.push(name.clone());
            }
        }
    }

    /// Check a delete batch without touching anything.
    fn validate_delete(&self, keys: &BTreeSet<String>, are_components: bool) -> Result<()> {
        if are_components {
            if keys.iter().any(|k| is_default_component(k)) {
                return Err(ConfigError::InvalidDelete(
                    "Cannot delete default component".to_string(),
                ));
            }
            for key in keys {
                let dependents = self.dependents(key);
                if !dependents.is_empty() {
                    return Err(ConfigError::InvalidDelete(format!(
                        "{} is in use in: {}",
                        key,
                        dependents.join(", ")
                    )));
                }
            }
            if !keys.iter().all(|k| self.components.contains_key(k)) {
                return Err(ConfigError::InvalidDelete(
                    "Delete list contains unknown components".to_string(),
                ));
            }
        } else {
            if keys.iter().any(|k| self.is_active(k, false)) {
                return Err(ConfigError::InvalidDelete(
                    "Cannot delete currently active configuration".to_string(),
                ));
            }
            if !keys.iter().all(|k| self.configs.contains_key(k)) {
                return Err(ConfigError::InvalidDelete(
                    "Delete list contains unknown configurations".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn snapshot(&mut self) -> RegistrySnapshot {
        self.version += 1;
        RegistrySnapshot {
            version: self.version,
            configs: self.configs.values().map(Entry::summary).collect(),
            components: self
                .components
                .iter()
                .map(|(key, entry)| ComponentSummary {
                    summary: entry.summary(),
                    dependents: self.dependents(key),
                })
                .collect(),
            active_config: self.active_config.clone(),
            active_config_changed: self.active_changed,
            config_details: self
                .configs
                .values()
                .map(|e| (e.public_id.clone(), e.details.clone()))
                .collect(),
            component_details: self
                .components
                .values()
                .map(|e| (e.public_id.clone(), e.details.clone()))
                .collect(),
        }
    }
}

/// Registry of every configuration and component on disk.
///
/// All mutations serialize through one mutex and publish a fresh snapshot
/// before returning. Version-control work is best-effort and logged.
pub struct ConfigListManager {
    state: Mutex<RegistryState>,
    publisher: SnapshotPublisher,
    store: Arc<dyn ConfigStore>,
    vcs: Arc<dyn VersionControl>,
    pv_prefix: String,
}

impl ConfigListManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        vcs: Arc<dyn VersionControl>,
        pv_prefix: impl Into<String>,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
            publisher: SnapshotPublisher::new(),
            store,
            vcs,
            pv_prefix: pv_prefix.into(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(ConfigError::lock)
    }

    fn publish(&self, state: &mut RegistryState) {
        self.publisher.publish(state.snapshot());
    }

    /// A holder with `name` loaded from the store, components attached.
    pub fn load_holder(&self, name: &str, is_component: bool) -> Result<ConfigHolder> {
        let mut holder =
            ConfigHolder::new(self.pv_prefix.clone(), self.store.clone(), self.vcs.clone());
        holder.load(name, is_component)?;
        Ok(holder)
    }

    /// Populate the registry from the store.
    ///
    /// Components are read first so configuration dependencies resolve. The
    /// default component is created if missing. Entries that fail to load
    /// are logged and skipped.
    pub fn import_configs(&self) -> Result<()> {
        let mut state = self.lock()?;

        for is_component in [true, false] {
            if !is_component {
                if let Err(e) = self.store.ensure_default_component() {
                    error!(error = %e, "unable to create default component");
                }
            }
            let kind = if is_component { "component" } else { "configuration" };
            let names = match self.store.list(is_component) {
                Ok(names) => names,
                Err(e) => {
                    error!(kind, error = %e, "unable to list");
                    continue;
                }
            };
            for name in names {
                match self.load_holder(&name, is_component) {
                    Ok(holder) => {
                        state.register(&holder, is_component);
                        let path = self.store.path_for(&name, is_component);
                        if let Err(e) = self.vcs.add(&path) {
                            warn!(kind, name = %name, error = %e, "unable to add to version control");
                        }
                    }
                    Err(e) => error!(kind, name = %name, error = %e, "error loading"),
                }
            }
        }

        if let Err(e) = self.vcs.commit("Blockserver started, configs updated") {
            warn!(error = %e, "unable to commit configurations to version control");
        }
        info!(
            configs = state.configs.len(),
            components = state.components.len(),
            "registry imported"
        );
        self.publish(&mut state);
        Ok(())
    }

    /// Add or replace the listing for `holder`'s configuration.
    pub fn register(&self, holder: &ConfigHolder, is_component: bool) -> Result<()> {
        let mut state = self.lock()?;
        state.register(holder, is_component);
        self.publish(&mut state);
        Ok(())
    }

    /// Register a configuration that changed on disk.
    ///
    /// Returns true, and raises the active-changed flag, if it is the active
    /// configuration or one of its components.
    pub fn update(&self, holder: &ConfigHolder, is_component: bool) -> Result<bool> {
        let mut state = self.lock()?;
        state.register(holder, is_component);
        let affected = state.is_active(holder.name(), is_component);
        if affected {
            info!(name = %holder.name(), is_component, "active configuration edited on disk, reload to receive changes");
            state.active_changed = true;
        }
        self.publish(&mut state);
        Ok(affected)
    }

    /// Raise the active-changed flag if `name` is part of the active
    /// configuration. Returns whether it was.
    pub fn flag_if_active(&self, name: &str, is_component: bool) -> Result<bool> {
        let mut state = self.lock()?;
        let affected = state.is_active(name, is_component);
        if affected && !state.active_changed {
            state.active_changed = true;
            self.publish(&mut state);
        }
        Ok(affected)
    }

    /// Delete configurations (or components) and their files.
    ///
    /// The whole batch is validated first: one bad name and nothing is deleted.
    pub fn delete(&self, names: &[String], are_components: bool) -> Result<()> {
        let mut state = self.lock()?;
        info!(names = %names.join(", "), are_components, "deleting");
        if names.is_empty() {
            return Ok(());
        }

        let keys: BTreeSet<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
        state.validate_delete(&keys, are_components)?;

        let mut removed = Vec::with_capacity(keys.len());
        for key in &keys {
            let entry = if are_components {
                state.dependencies.remove(key);
                state.components.remove(key)
            } else {
                state.configs.remove(key)
            };
            if let Some(entry) = entry {
                if !are_components {
                    state.remove_config_from_dependencies(&entry.meta.name);
                }
                removed.push(entry.meta.name);
            }
        }

        for name in &removed {
            if let Err(e) = self.store.delete(name, are_components) {
                error!(name = %name, error = %e, "unable to delete files");
            }
            let path = self.store.path_for(name, are_components);
            if let Err(e) = self.vcs.remove(&path) {
                error!(name = %name, error = %e, "could not remove from version control");
            }
        }
        if let Err(e) = self.vcs.commit(&format!("Deleted {}", removed.join(", "))) {
            warn!(error = %e, "unable to update version control after deletion");
        }

        self.publish(&mut state);
        Ok(())
    }

    /// Configurations that declare `component`.
    pub fn dependents(&self, component: &str) -> Result<Vec<String>> {
        Ok(self.lock()?.dependents(component))
    }

    pub fn configs(&self) -> Result<Vec<ConfigSummary>> {
        Ok(self.lock()?.configs.values().map(Entry::summary).collect())
    }

    /// Every listed component. The default component is not listed.
    pub fn components(&self) -> Result<Vec<ComponentSummary>> {
        let state = self.lock()?;
        Ok(state
            .components
            .iter()
            .map(|(key, entry)| ComponentSummary {
                summary: entry.summary(),
                dependents: state.dependents(key),
            })
            .collect())
    }

    pub fn contains(&self, name: &str, is_component: bool) -> Result<bool> {
        let state = self.lock()?;
        let key = name.to_ascii_lowercase();
        Ok(if is_component {
            state.components.contains_key(&key)
        } else {
            state.configs.contains_key(&key)
        })
    }

    pub fn public_id(&self, name: &str, is_component: bool) -> Result<Option<String>> {
        let state = self.lock()?;
        let key = name.to_ascii_lowercase();
        let entries = if is_component {
            &state.components
        } else {
            &state.configs
        };
        Ok(entries.get(&key).map(|e| e.public_id.clone()))
    }

    // ── Active configuration ──

    /// Record the newly activated configuration. Clears the active-changed flag.
    pub fn set_active(&self, name: &str, components: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        state.active_config = name.to_string();
        state.active_components = components.to_vec();
        state.active_changed = false;
        debug!(name = %name, components = ?components, "active configuration set");
        self.publish(&mut state);
        Ok(())
    }

    pub fn active_config_name(&self) -> Result<String> {
        Ok(self.lock()?.active_config.clone())
    }

    pub fn active_config_changed(&self) -> Result<bool> {
        Ok(self.lock()?.active_changed)
    }

    pub fn acknowledge_active_changed(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.active_changed {
            state.active_changed = false;
            self.publish(&mut state);
        }
        Ok(())
    }

    /// Restore the working tree to the last commit.
    pub fn recover_from_version_control(&self) {
        if let Err(e) = self.vcs.revert_to_head() {
            warn!(error = %e, "unable to recover configurations from version control");
        }
    }

    // ── Publication ──

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.publisher.current()
    }

    pub fn subscribe(&self) -> SnapshotWatcher {
        self.publisher.subscribe()
    }
}
