//! The config server: the operations clients invoke, tying the active
//! holder, the registry, IOC control and the watcher together.

use std::sync::Arc;

use config_types::Named;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ConfigError, Result};
use crate::holder::{ActiveConfigHolder, ConfigDescription, ConfigDetails, ConfigHolder};
use crate::ioc_control::IocControl;
use crate::ports::{
    ArchiverSink, ConfigStore, ProcessSupervisor, RunControlSink, VersionControl, WatcherControl,
};
use crate::registry::{ConfigListManager, RegistrySnapshot, SnapshotWatcher};
use crate::watcher::PauseGuard;

/// Adapters a [`ConfigServer`] is built from.
pub struct ServerAdapters {
    pub store: Arc<dyn ConfigStore>,
    pub vcs: Arc<dyn VersionControl>,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub archiver: Arc<dyn ArchiverSink>,
    pub runcontrol: Arc<dyn RunControlSink>,
    pub watcher: Arc<dyn WatcherControl>,
}

pub struct ConfigServer {
    active: ActiveConfigHolder,
    registry: Arc<ConfigListManager>,
    iocs: IocControl,
    watcher: Arc<dyn WatcherControl>,
    store: Arc<dyn ConfigStore>,
    vcs: Arc<dyn VersionControl>,
    pv_prefix: String,
}

impl ConfigServer {
    pub fn new(
        settings: &ServerConfig,
        registry: Arc<ConfigListManager>,
        adapters: ServerAdapters,
    ) -> Self {
        let holder = ConfigHolder::new(
            settings.pv_prefix.clone(),
            adapters.store.clone(),
            adapters.vcs.clone(),
        );
        let active = ActiveConfigHolder::new(
            holder,
            adapters.archiver,
            adapters.runcontrol,
            settings.last_config_path(),
        );
        Self {
            active,
            registry,
            iocs: IocControl::new(adapters.supervisor),
            watcher: adapters.watcher,
            store: adapters.store,
            vcs: adapters.vcs,
            pv_prefix: settings.pv_prefix.clone(),
        }
    }

    pub fn active(&self) -> &ActiveConfigHolder {
        &self.active
    }

    pub fn registry(&self) -> &Arc<ConfigListManager> {
        &self.registry
    }

    pub fn ioc_control(&self) -> &IocControl {
        &self.iocs
    }

    pub fn details(&self) -> ConfigDetails {
        self.active.config_details()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn subscribe(&self) -> SnapshotWatcher {
        self.registry.subscribe()
    }

    // ── Activation ──

    /// Activate `name`, starting, restarting and stopping only the IOCs
    /// whose configuration changed.
    pub fn load_config(&mut self, name: &str) -> Result<()> {
        info!(name = %name, "Loading configuration");
        self.active.load_active(name)?;
        self.initialise(false)
    }

    /// Reload the active configuration from disk and (re)start all of its
    /// autostart IOCs.
    pub fn reload_current_config(&mut self) -> Result<()> {
        info!("Reloading current configuration");
        self.active.reload_current_config()?;
        self.initialise(true)
    }

    /// Activate the configuration used last. Falls back to a blank
    /// configuration if there is none or it cannot be loaded.
    pub fn load_last_config(&mut self) -> Result<Option<String>> {
        let loaded = match self.active.load_last_config() {
            Ok(Some(name)) => {
                info!(name = %name, "Loaded last configuration");
                Some(name)
            }
            Ok(None) => {
                info!("Could not retrieve last configuration - starting blank configuration");
                self.active.clear_active();
                None
            }
            Err(e) => {
                error!(error = %e, "Could not load last configuration - starting blank configuration");
                self.active.clear_active();
                None
            }
        };
        self.initialise(true)?;
        Ok(loaded)
    }

    /// Replace the active configuration with a blank one.
    pub fn clear_config(&mut self) -> Result<()> {
        self.active.clear_active();
        self.initialise(false)
    }

    /// Bring IOCs, hooks and the registry in line with the active holder.
    fn initialise(&mut self, full_init: bool) -> Result<()> {
        let changes = self.active.iocs_changed();
        let composed = self.active.iocs();
        if full_init {
            self.iocs.stop_iocs(&changes.stop.iter().collect::<Vec<_>>(), false);
            self.iocs.start_config_iocs(&composed);
        } else {
            self.iocs.apply_changes(&changes, &composed);
        }

        self.active.update_archiver(full_init);
        self.active.update_runcontrol();
        self.registry
            .set_active(self.active.name(), &self.active.component_names(true))
    }

    // ── Saving ──

    /// Save the active configuration under `name`.
    pub fn save_active(&mut self, name: &str, as_component: bool) -> Result<()> {
        let _paused = PauseGuard::new(self.watcher.as_ref());
        info!(name = %name, as_component, "Saving active configuration");
        self.active.save_active(name, as_component)?;
        self.register_from_store(name, as_component)
    }

    /// Save a configuration (or component) that is not active.
    ///
    /// The active configuration cannot be overwritten this way. Saving a
    /// component the active configuration uses reloads the active
    /// configuration.
    pub fn save_inactive(&mut self, desc: &ConfigDescription, as_component: bool) -> Result<()> {
        let name = desc.name.clone().unwrap_or_default();
        if !as_component && !self.active.name().is_empty() && self.active.name().eq_ignore_ascii_case(&name)
        {
            return Err(ConfigError::InvalidOperation(format!(
                "Cannot save over the active configuration {}",
                name
            )));
        }
        self.write_inactive(desc, as_component)?;

        let uses_component = as_component
            && self
                .active
                .component_names(false)
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&name));
        if uses_component {
            info!(name = %name, "active component saved, reloading configuration");
            let current = self.active.name().to_string();
            self.load_config(&current)?;
        }
        Ok(())
    }

    /// Save `desc` over the active configuration and reload it.
    pub fn set_current_config_details(&mut self, desc: &ConfigDescription) -> Result<()> {
        let current = self.active.name().to_string();
        let requested = desc.name.clone().unwrap_or_default();
        if !current.is_empty() && !current.eq_ignore_ascii_case(&requested) {
            warn!(
                requested = %requested,
                current = %current,
                "config details to be set did not match current config"
            );
        }
        self.write_inactive(desc, false)?;
        let target = if current.is_empty() { requested } else { current };
        self.load_config(&target)
    }

    /// Persist a description through a fresh holder, keeping the history
    /// already on disk.
    fn write_inactive(&self, desc: &ConfigDescription, as_component: bool) -> Result<()> {
        let name = desc.name.clone().unwrap_or_default();
        let mut inactive =
            ConfigHolder::new(self.pv_prefix.clone(), self.store.clone(), self.vcs.clone());

        let history = match inactive.load_configuration(&name, as_component) {
            Ok(existing) => existing.meta.history,
            Err(_) => Vec::new(),
        };
        inactive.set_details_from_description(desc)?;
        inactive.set_history(history);

        let _paused = PauseGuard::new(self.watcher.as_ref());
        info!(name = %name, as_component, "Saving configuration");
        inactive.save(&name, as_component)?;
        self.register_from_store(inactive.config().name(), as_component)
    }

    fn register_from_store(&self, name: &str, is_component: bool) -> Result<()> {
        let holder = self.registry.load_holder(name, is_component)?;
        self.registry.register(&holder, is_component)
    }

    // ── Registry ──

    pub fn delete(&self, names: &[String], are_components: bool) -> Result<()> {
        let _paused = PauseGuard::new(self.watcher.as_ref());
        self.registry.delete(names, are_components)
    }

    pub fn acknowledge_active_changed(&self) -> Result<()> {
        self.registry.acknowledge_active_changed()
    }

    // ── Manual IOC control ──

    pub fn start_iocs(&self, iocs: &[String]) {
        self.iocs.start_iocs(iocs);
    }

    pub fn stop_iocs(&self, iocs: &[String]) {
        self.iocs.stop_iocs(iocs, false);
    }

    pub fn restart_iocs(&self, iocs: &[String]) {
        self.iocs.restart_iocs(iocs, false);
    }
}
