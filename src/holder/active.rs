use std::collections::BTreeSet;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use config_types::constants::{is_default_component, BLOCK_PREFIX, DEFAULT_COMPONENT};
use config_types::{Block, Configuration, NamedList};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::holder::config_holder::{compose_iocs, ConfigHolder};
use crate::holder::description::ConfigDescription;
use crate::ports::{ArchiverSink, RunControlSink};

/// IOC lifecycle actions needed to move from one active snapshot to the next.
///
/// The three sets are disjoint. Names are upper-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IocChanges {
    pub start: BTreeSet<String>,
    pub restart: BTreeSet<String>,
    pub stop: BTreeSet<String>,
}

impl IocChanges {
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.restart.is_empty() && self.stop.is_empty()
    }
}

fn ioc_key(name: &str) -> String {
    name.to_ascii_uppercase()
}

fn blocks_changed_in_config(old: &Configuration, new: &Configuration) -> bool {
    let changed_or_added = new
        .blocks
        .iter()
        .any(|b| old.blocks.get(&b.name) != Some(b));
    let removed = old.blocks.iter().any(|b| !new.blocks.contains(&b.name));
    changed_or_added || removed
}

fn component_keys(components: &NamedList<Configuration>) -> BTreeSet<String> {
    components
        .iter()
        .map(|c| c.meta.name.to_ascii_lowercase())
        .collect()
}

/// The holder of the live configuration.
///
/// Every activation caches the previous snapshot first, so
/// [`iocs_changed`](Self::iocs_changed) and
/// [`blocks_changed`](Self::blocks_changed) describe the step from the
/// previous active configuration to the current one.
pub struct ActiveConfigHolder {
    holder: ConfigHolder,
    archiver: Arc<dyn ArchiverSink>,
    runcontrol: Arc<dyn RunControlSink>,
    last_config_file: PathBuf,
}

impl Deref for ActiveConfigHolder {
    type Target = ConfigHolder;

    fn deref(&self) -> &ConfigHolder {
        &self.holder
    }
}

impl DerefMut for ActiveConfigHolder {
    fn deref_mut(&mut self) -> &mut ConfigHolder {
        &mut self.holder
    }
}

impl ActiveConfigHolder {
    pub fn new(
        holder: ConfigHolder,
        archiver: Arc<dyn ArchiverSink>,
        runcontrol: Arc<dyn RunControlSink>,
        last_config_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            holder,
            archiver,
            runcontrol,
            last_config_file: last_config_file.into(),
        }
    }

    /// Make `name` the active configuration.
    ///
    /// On failure the previous configuration stays active and nothing is
    /// reported as changed.
    pub fn load_active(&mut self, name: &str) -> Result<()> {
        self.holder.cache();
        if let Err(e) = self.holder.load(name, false) {
            self.holder.restore_cache();
            return Err(e);
        }
        self.record_last_config(name);
        Ok(())
    }

    /// Save the active configuration under `name`.
    ///
    /// Live run-control limits are written onto native blocks first. Saving
    /// as a component writes a copy and leaves the active holder as it is.
    pub fn save_active(&mut self, name: &str, as_component: bool) -> Result<()> {
        if as_component {
            return self.holder.clone().save(name, true);
        }

        match self.runcontrol.current_settings() {
            Ok(settings) => self.holder.update_runcontrol_settings_for_saving(&settings),
            Err(e) => warn!(error = %e, "unable to read run-control settings, saving without them"),
        }
        self.holder.save(name, false)?;
        self.record_last_config(name);
        Ok(())
    }

    /// Empty the active configuration, keeping the previous one for diffing.
    pub fn clear_active(&mut self) {
        self.holder.cache();
        self.holder.clear_config();
    }

    /// Replace the active contents from a client description.
    ///
    /// The default component is re-attached, as it is for every top-level
    /// configuration.
    pub fn set_details_from_description(&mut self, desc: &ConfigDescription) -> Result<()> {
        self.holder.set_details_from_description(desc)?;
        if self.holder.is_component()
            || self
                .holder
                .component_names(true)
                .iter()
                .any(|c| is_default_component(c))
        {
            return Ok(());
        }

        let attached = self
            .holder
            .load_configuration(DEFAULT_COMPONENT, true)
            .and_then(|base| self.holder.add_component(DEFAULT_COMPONENT, base));
        if let Err(e) = attached {
            self.holder.restore_cache();
            return Err(e);
        }
        Ok(())
    }

    // ── Last configuration ──

    pub fn last_config_path(&self) -> &PathBuf {
        &self.last_config_file
    }

    /// Remember `name` as the configuration to load on the next start.
    pub fn set_last_config(&self, name: &str) -> Result<()> {
        if let Some(parent) = self.last_config_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.last_config_file, format!("{}\n", name))?;
        Ok(())
    }

    fn record_last_config(&self, name: &str) {
        if let Err(e) = self.set_last_config(name) {
            error!(name = %name, error = %e, "unable to record last configuration");
        }
    }

    /// Name stored in the last-config file, if any.
    ///
    /// Older files stored a path; only its final segment is used.
    pub fn last_config_name(&self) -> Result<Option<String>> {
        if !self.last_config_file.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.last_config_file)?;
        let first_line = text.lines().next().unwrap_or_default().trim();
        let name: String = first_line
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    /// Activate the last used configuration. Returns its name, or `None` when
    /// there is nothing to load.
    pub fn load_last_config(&mut self) -> Result<Option<String>> {
        let Some(name) = self.last_config_name()? else {
            info!("No last configuration defined");
            return Ok(None);
        };
        info!(name = %name, "Trying to load last configuration");
        self.load_active(&name)?;
        Ok(Some(name))
    }

    pub fn reload_current_config(&mut self) -> Result<()> {
        let name = self.holder.name().to_string();
        if name.is_empty() {
            info!("No current configuration defined. Nothing to reload.");
            return Ok(());
        }
        info!(name = %name, "Trying to reload current configuration");
        self.load_active(&name)
    }

    // ── Diffing ──

    /// IOCs to start, restart and stop to move from the cached snapshot to
    /// the current one, compared on the composed views.
    ///
    /// A name composed before and after is restarted when the tracked fields
    /// of the winning entries differ, or started when the new winning entry
    /// comes from a component that was not attached before.
    pub fn iocs_changed(&self) -> IocChanges {
        let old = compose_iocs(self.holder.cached_config(), self.holder.cached_components());
        let new = self.holder.iocs();
        let old_components = self.holder.cached_components();

        let mut changes = IocChanges::default();
        for ioc in &new {
            let newly_attached = ioc
                .component
                .as_deref()
                .is_some_and(|owner| !old_components.contains(owner));
            match old.get(&ioc.name) {
                None => {
                    changes.start.insert(ioc_key(&ioc.name));
                }
                Some(_) if newly_attached => {
                    changes.start.insert(ioc_key(&ioc.name));
                }
                Some(previous) if previous.needs_restart_for(ioc) => {
                    changes.restart.insert(ioc_key(&ioc.name));
                }
                Some(_) => {}
            }
        }
        for ioc in &old {
            if !new.contains(&ioc.name) {
                changes.stop.insert(ioc_key(&ioc.name));
            }
        }
        changes
    }

    /// True if any composed block was added, removed or changed, or the set
    /// of attached components differs from the cached snapshot.
    pub fn blocks_changed(&self) -> bool {
        let old = self.holder.cached_config();
        let new = self.holder.config();
        let old_components = self.holder.cached_components();
        let new_components = self.holder.components();

        if component_keys(old_components) != component_keys(new_components) {
            return true;
        }
        let components_changed = new_components.iter().any(|c| {
            old_components
                .get(&c.meta.name)
                .is_some_and(|previous| blocks_changed_in_config(previous, c))
        });
        blocks_changed_in_config(old, new) || components_changed
    }

    // ── Hooks ──

    /// Push the composed blocks to the archiver if forced or if they changed.
    /// Returns whether an update was sent.
    pub fn update_archiver(&self, full_init: bool) -> bool {
        if !(full_init || self.blocks_changed()) {
            return false;
        }
        let prefix = format!("{}{}", self.holder.pv_prefix(), BLOCK_PREFIX);
        let blocks: Vec<Block> = self.holder.blocks().into_vec();
        if let Err(e) = self.archiver.update_archiver(&prefix, &blocks) {
            error!(error = %e, "unable to update archiver");
        }
        true
    }

    pub fn update_runcontrol(&self) {
        let blocks: Vec<Block> = self.holder.blocks().into_vec();
        if let Err(e) = self.runcontrol.update_runcontrol(&blocks) {
            error!(error = %e, "unable to update run-control");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::RecordingHooks;
    use crate::ports::ConfigStore;
    use crate::store::{MemoryConfigStore, MemoryVersionControl};
    use config_types::{Ioc, RunControlSettings, SimLevel};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        active: ActiveConfigHolder,
        store: Arc<MemoryConfigStore>,
        hooks: Arc<RecordingHooks>,
        _tmp: TempDir,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryConfigStore::with_default_component());
        let hooks = Arc::new(RecordingHooks::new());
        let holder = ConfigHolder::new(
            "IN:TEST:",
            store.clone(),
            Arc::new(MemoryVersionControl::new()),
        );
        let active = ActiveConfigHolder::new(
            holder,
            hooks.clone(),
            hooks.clone(),
            tmp.path().join("last_config.txt"),
        );
        Fixture {
            active,
            store,
            hooks,
            _tmp: tmp,
        }
    }

    fn config_with_iocs(name: &str, iocs: Vec<Ioc>) -> Configuration {
        let mut config = Configuration::new(name);
        for ioc in iocs {
            config.add_ioc(ioc);
        }
        config
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn macro_change_restarts_ioc() {
        let mut f = fixture();
        f.store
            .save(&config_with_iocs("OLD", vec![Ioc::new("IOC1").with_macro("X", "1")]), false)
            .unwrap();
        f.store
            .save(&config_with_iocs("NEW", vec![Ioc::new("IOC1").with_macro("X", "2")]), false)
            .unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();

        let changes = f.active.iocs_changed();
        assert!(changes.start.is_empty());
        assert_eq!(changes.restart, set(&["IOC1"]));
        assert!(changes.stop.is_empty());
    }

    #[test]
    fn added_and_removed_iocs() {
        let mut f = fixture();
        f.store
            .save(
                &config_with_iocs("OLD", vec![Ioc::new("KEEP"), Ioc::new("GONE")]),
                false,
            )
            .unwrap();
        f.store
            .save(
                &config_with_iocs(
                    "NEW",
                    vec![Ioc::new("KEEP").with_simlevel(SimLevel::Devsim), Ioc::new("ADDED")],
                ),
                false,
            )
            .unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();

        let changes = f.active.iocs_changed();
        assert_eq!(changes.start, set(&["ADDED"]));
        assert_eq!(changes.restart, set(&["KEEP"]));
        assert_eq!(changes.stop, set(&["GONE"]));
    }

    #[test]
    fn autostart_change_is_not_a_restart() {
        let mut f = fixture();
        let mut quiet = Ioc::new("IOC1");
        quiet.autostart = false;
        f.store
            .save(&config_with_iocs("OLD", vec![Ioc::new("IOC1")]), false)
            .unwrap();
        f.store.save(&config_with_iocs("NEW", vec![quiet]), false).unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();
        assert!(f.active.iocs_changed().is_empty());
    }

    #[test]
    fn ioc_moving_between_components_is_started_not_stopped() {
        let mut f = fixture();
        let mut c1 = Configuration::component("C1");
        c1.add_ioc(Ioc::new("SHARED"));
        let mut c2 = Configuration::component("C2");
        c2.add_ioc(Ioc::new("SHARED"));
        f.store.save(&c1, true).unwrap();
        f.store.save(&c2, true).unwrap();

        let mut old = Configuration::new("OLD");
        old.add_component("C1").unwrap();
        let mut new = Configuration::new("NEW");
        new.add_component("C2").unwrap();
        f.store.save(&old, false).unwrap();
        f.store.save(&new, false).unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();

        let changes = f.active.iocs_changed();
        assert_eq!(changes.start, set(&["SHARED"]));
        assert!(changes.stop.is_empty());
        assert!(changes.restart.is_empty());
    }

    #[test]
    fn ioc_change_sets_are_disjoint() {
        let mut f = fixture();
        let mut comp = Configuration::component("C1");
        comp.add_ioc(Ioc::new("A").with_macro("X", "1"));
        f.store.save(&comp, true).unwrap();

        let mut old = config_with_iocs("OLD", vec![Ioc::new("A"), Ioc::new("B")]);
        old.add_component("C1").unwrap();
        let new = config_with_iocs("NEW", vec![Ioc::new("B").with_restart(false), Ioc::new("C")]);
        f.store.save(&old, false).unwrap();
        f.store.save(&new, false).unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();

        let changes = f.active.iocs_changed();
        assert!(changes.start.is_disjoint(&changes.restart));
        assert!(changes.start.is_disjoint(&changes.stop));
        assert!(changes.restart.is_disjoint(&changes.stop));
        assert_eq!(changes.start, set(&["C"]));
        assert_eq!(changes.restart, set(&["B"]));
        assert_eq!(changes.stop, set(&["A"]));
    }

    #[test]
    fn ioc_still_provided_by_component_is_restarted_not_stopped() {
        let mut f = fixture();
        let mut comp = Configuration::component("C1");
        comp.add_ioc(Ioc::new("X").with_macro("M", "comp"));
        f.store.save(&comp, true).unwrap();

        let mut old = config_with_iocs("OLD", vec![Ioc::new("X").with_macro("M", "native")]);
        old.add_component("C1").unwrap();
        let mut new = Configuration::new("NEW");
        new.add_component("C1").unwrap();
        f.store.save(&old, false).unwrap();
        f.store.save(&new, false).unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();

        let changes = f.active.iocs_changed();
        assert!(changes.start.is_empty());
        assert!(changes.stop.is_empty());
        assert_eq!(changes.restart, set(&["X"]));
    }

    #[test]
    fn ioc_taken_over_natively_with_same_fields_is_left_alone() {
        let mut f = fixture();
        let mut comp = Configuration::component("C1");
        comp.add_ioc(Ioc::new("X").with_macro("M", "1"));
        f.store.save(&comp, true).unwrap();

        let mut old = Configuration::new("OLD");
        old.add_component("C1").unwrap();
        let mut new = config_with_iocs("NEW", vec![Ioc::new("X").with_macro("M", "1")]);
        new.add_component("C1").unwrap();
        f.store.save(&old, false).unwrap();
        f.store.save(&new, false).unwrap();

        f.active.load_active("OLD").unwrap();
        f.active.load_active("NEW").unwrap();
        assert!(f.active.iocs_changed().is_empty());
    }

    #[test]
    fn failed_load_keeps_previous_active() {
        let mut f = fixture();
        f.store
            .save(&config_with_iocs("GOOD", vec![Ioc::new("IOC1")]), false)
            .unwrap();
        f.active.load_active("GOOD").unwrap();

        assert!(f.active.load_active("MISSING").is_err());
        assert_eq!(f.active.name(), "GOOD");
        assert!(f.active.iocs_changed().is_empty());
        assert!(!f.active.blocks_changed());
    }

    #[test]
    fn blocks_changed_detects_edits() {
        let mut f = fixture();
        let mut one = Configuration::new("ONE");
        one.add_block(Block::new("A", "PV1"), "G").unwrap();
        let mut two = one.clone();
        two.set_name("TWO");
        two.blocks.get_mut("A").unwrap().visible = false;
        f.store.save(&one, false).unwrap();
        f.store.save(&two, false).unwrap();

        f.active.load_active("ONE").unwrap();
        f.active.reload_current_config().unwrap();
        assert!(!f.active.blocks_changed());

        f.active.load_active("TWO").unwrap();
        assert!(f.active.blocks_changed());
    }

    #[test]
    fn blocks_changed_when_component_with_blocks_attached() {
        let mut f = fixture();
        let mut comp = Configuration::component("C1");
        comp.add_block(Block::new("D", "PV3"), "G").unwrap();
        f.store.save(&comp, true).unwrap();
        let mut with = Configuration::new("WITH");
        with.add_component("C1").unwrap();
        f.store.save(&Configuration::new("WITHOUT"), false).unwrap();
        f.store.save(&with, false).unwrap();

        f.active.load_active("WITHOUT").unwrap();
        f.active.load_active("WITH").unwrap();
        assert!(f.active.blocks_changed());
        f.active.load_active("WITHOUT").unwrap();
        assert!(f.active.blocks_changed());
    }

    #[test]
    fn blocks_changed_when_blockless_component_attached() {
        let mut f = fixture();
        let mut comp = Configuration::component("C1");
        comp.add_ioc(Ioc::new("ONLY_IOC"));
        f.store.save(&comp, true).unwrap();
        let mut with = Configuration::new("WITH");
        with.add_component("C1").unwrap();
        f.store.save(&Configuration::new("WITHOUT"), false).unwrap();
        f.store.save(&with, false).unwrap();

        f.active.load_active("WITHOUT").unwrap();
        f.active.load_active("WITH").unwrap();
        assert!(f.active.blocks_changed());
        f.active.reload_current_config().unwrap();
        assert!(!f.active.blocks_changed());
    }

    #[test]
    fn last_config_round_trip_strips_paths() {
        let mut f = fixture();
        f.store.save(&Configuration::new("TEST_CONFIG"), false).unwrap();
        assert_eq!(f.active.load_last_config().unwrap(), None);

        fs::write(f.active.last_config_path(), "configurations\\TEST_CONFIG\n").unwrap();
        assert_eq!(
            f.active.load_last_config().unwrap().as_deref(),
            Some("TEST_CONFIG")
        );
        assert_eq!(f.active.name(), "TEST_CONFIG");
    }

    #[test]
    fn empty_last_config_file_means_blank() {
        let mut f = fixture();
        fs::write(f.active.last_config_path(), "\n").unwrap();
        assert_eq!(f.active.load_last_config().unwrap(), None);
    }

    #[test]
    fn load_active_records_last_config() {
        let mut f = fixture();
        f.store.save(&Configuration::new("TEST_CONFIG"), false).unwrap();
        f.active.load_active("TEST_CONFIG").unwrap();
        assert_eq!(
            f.active.last_config_name().unwrap().as_deref(),
            Some("TEST_CONFIG")
        );
    }

    #[test]
    fn save_active_applies_live_runcontrol() {
        let mut f = fixture();
        let mut config = Configuration::new("TEST_CONFIG");
        config.add_block(Block::new("A", "PV1"), "G").unwrap();
        f.store.save(&config, false).unwrap();
        f.active.load_active("TEST_CONFIG").unwrap();

        let live = RunControlSettings {
            enabled: true,
            low_limit: Some(0.5),
            high_limit: Some(1.5),
        };
        f.hooks
            .set_live_settings(BTreeMap::from([("A".to_string(), live)]))
            .unwrap();
        f.active.save_active("TEST_CONFIG", false).unwrap();

        let saved = f.store.load("TEST_CONFIG", false).unwrap();
        assert_eq!(saved.blocks.get("A").unwrap().runcontrol(), live);
    }

    #[test]
    fn save_active_as_component_keeps_active_holder() {
        let mut f = fixture();
        let mut config = Configuration::new("TEST_CONFIG");
        config.add_block(Block::new("A", "PV1"), "G").unwrap();
        f.store.save(&config, false).unwrap();
        f.active.load_active("TEST_CONFIG").unwrap();

        f.active.save_active("AS_COMP", true).unwrap();

        let saved = f.store.load("AS_COMP", true).unwrap();
        assert!(saved.is_component);
        assert_eq!(saved.block_names(), vec!["A"]);
        assert_eq!(f.active.name(), "TEST_CONFIG");
        assert!(!f.active.is_component());
        assert_eq!(f.active.component_names(true), vec![DEFAULT_COMPONENT]);
        assert_eq!(
            f.active.last_config_name().unwrap().as_deref(),
            Some("TEST_CONFIG")
        );
    }

    #[test]
    fn update_archiver_only_when_blocks_change() {
        let mut f = fixture();
        let mut config = Configuration::new("TEST_CONFIG");
        config.add_block(Block::new("A", "PV1"), "G").unwrap();
        f.store.save(&config, false).unwrap();

        f.active.load_active("TEST_CONFIG").unwrap();
        assert!(f.active.update_archiver(false));
        f.active.reload_current_config().unwrap();
        assert!(!f.active.update_archiver(false));
        assert!(f.active.update_archiver(true));
        assert_eq!(f.hooks.archiver_updates(), vec![vec!["A"], vec!["A"]]);
    }

    #[test]
    fn active_description_reattaches_default_component() {
        let mut f = fixture();
        let desc = ConfigDescription {
            name: Some("EDITED".to_string()),
            ..Default::default()
        };
        f.active.set_details_from_description(&desc).unwrap();
        assert_eq!(f.active.component_names(true), vec![DEFAULT_COMPONENT]);
        assert_eq!(f.active.name(), "EDITED");
    }
}
