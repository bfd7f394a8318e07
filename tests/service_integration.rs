//! End-to-end flow over the file-backed store.
//!
//! Configurations are written to a temporary directory, imported into the
//! registry and driven through the config server: activation, IOC diffing,
//! saving, deleting and reconciliation of hand edits.

use std::fs;
use std::sync::Arc;

use blockserver_config::holder::BlockDescription;
use blockserver_config::hooks::RecordingHooks;
use blockserver_config::ioc_control::{IocOp, RecordingSupervisor};
use blockserver_config::ports::{ConfigStore, NoWatcher};
use blockserver_config::store::{FileConfigStore, MemoryVersionControl, VcsOp};
use blockserver_config::watcher::{Reconciled, Reconciler, WatchEvent};
use blockserver_config::{
    ConfigDescription, ConfigError, ConfigListManager, ConfigServer, ServerAdapters, ServerConfig,
};
use config_types::{Block, Configuration, Ioc};
use tempfile::TempDir;

struct Harness {
    server: ConfigServer,
    registry: Arc<ConfigListManager>,
    store: Arc<FileConfigStore>,
    vcs: Arc<MemoryVersionControl>,
    supervisor: Arc<RecordingSupervisor>,
    hooks: Arc<RecordingHooks>,
    settings: ServerConfig,
    _tmp: TempDir,
}

fn seed(store: &FileConfigStore) {
    store.ensure_default_component().unwrap();

    let mut comp = Configuration::component("COMP1");
    comp.add_block(Block::new("D", "PV3"), "GROUP1").unwrap();
    comp.add_ioc(Ioc::new("COMP_IOC"));
    store.save(&comp, true).unwrap();

    let mut main = Configuration::new("MAIN");
    main.add_block(Block::new("A", "PV1"), "GROUP1").unwrap();
    main.add_block(Block::new("B", "PV2"), "GROUP2").unwrap();
    main.add_ioc(Ioc::new("IOC1").with_macro("X", "1"));
    main.add_component("COMP1").unwrap();
    main.meta.description = "main configuration".to_string();
    store.save(&main, false).unwrap();

    let mut alt = Configuration::new("ALT");
    alt.add_ioc(Ioc::new("IOC1").with_macro("X", "2"));
    store.save(&alt, false).unwrap();
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let settings = ServerConfig::default()
        .config_root(tmp.path())
        .pv_prefix("IN:DEMO:");
    let store = Arc::new(FileConfigStore::from_config(&settings));
    seed(&store);

    let vcs = Arc::new(MemoryVersionControl::new());
    let supervisor = Arc::new(RecordingSupervisor::new());
    let hooks = Arc::new(RecordingHooks::new());
    let registry = Arc::new(ConfigListManager::new(
        store.clone(),
        vcs.clone(),
        settings.pv_prefix.clone(),
    ));
    registry.import_configs().unwrap();

    let server = ConfigServer::new(
        &settings,
        registry.clone(),
        ServerAdapters {
            store: store.clone(),
            vcs: vcs.clone(),
            supervisor: supervisor.clone(),
            archiver: hooks.clone(),
            runcontrol: hooks.clone(),
            watcher: Arc::new(NoWatcher),
        },
    );

    Harness {
        server,
        registry,
        store,
        vcs,
        supervisor,
        hooks,
        settings,
        _tmp: tmp,
    }
}

#[test]
fn import_publishes_listing_and_details() {
    let h = harness();
    let snapshot = h.server.snapshot();

    let names: Vec<&str> = snapshot.configs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ALT", "MAIN"]);
    assert_eq!(
        snapshot.config("MAIN").unwrap().description,
        "main configuration"
    );
    assert_eq!(snapshot.component("COMP1").unwrap().dependents, vec!["MAIN"]);
    assert!(snapshot.component("_base").is_none());

    let details = &snapshot.config_details["MAIN"];
    let group1 = details.groups.iter().find(|g| g.name == "GROUP1").unwrap();
    assert_eq!(group1.blocks, vec!["A", "D"]);
    assert!(details.groups.iter().all(|g| g.name != "NONE"));
    assert_eq!(details.blocks[0].pv, "IN:DEMO:PV1");
    assert_eq!(
        h.vcs.commits(),
        vec!["Blockserver started, configs updated"]
    );
}

#[test]
fn activation_cycle() {
    let mut h = harness();
    h.server.load_config("MAIN").unwrap();
    let ops = h.supervisor.ops();
    assert!(ops.contains(&IocOp::Start("IOC1".to_string())));
    assert!(ops.contains(&IocOp::Start("COMP_IOC".to_string())));
    assert_eq!(h.hooks.archiver_updates().last().unwrap(), &vec!["A", "B", "D"]);

    h.supervisor.clear_ops();
    h.server.load_config("ALT").unwrap();
    let ops = h.supervisor.ops();
    assert!(ops.contains(&IocOp::Restart("IOC1".to_string())));
    assert!(ops.contains(&IocOp::Stop("COMP_IOC".to_string())));
    assert_eq!(ops.len(), 2);

    let last = fs::read_to_string(h.settings.last_config_path()).unwrap();
    assert_eq!(last.trim(), "ALT");
}

#[test]
fn active_configuration_and_used_components_are_protected() {
    let mut h = harness();
    h.server.load_config("MAIN").unwrap();

    let err = h.server.delete(&["MAIN".to_string()], false).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDelete(_)));
    let err = h.server.delete(&["COMP1".to_string()], true).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDelete(_)));
    assert!(h.store.exists("COMP1", true));

    h.server.delete(&["ALT".to_string()], false).unwrap();
    assert!(!h.store.exists("ALT", false));
    assert!(h.server.snapshot().config("ALT").is_none());
}

#[test]
fn saved_description_round_trips_through_disk() {
    let mut h = harness();
    let desc = ConfigDescription {
        name: Some("NEW_CONFIG".to_string()),
        description: Some("from a client".to_string()),
        blocks: vec![
            BlockDescription::new(Block::new("X", "IN:DEMO:PVX"), "GROUPX"),
            BlockDescription {
                block: Block::new("Y", "PVY"),
                group: None,
            },
        ],
        iocs: vec![Ioc::new("SIMPLE")],
        components: vec![blockserver_config::holder::ComponentRef::new("COMP1")],
        ..Default::default()
    };
    h.server.save_inactive(&desc, false).unwrap();

    let saved = h.store.load("NEW_CONFIG", false).unwrap();
    assert_eq!(saved.blocks.get("X").unwrap().pv, "PVX");
    assert_eq!(saved.components, vec!["COMP1"]);
    assert_eq!(saved.meta.history.len(), 1);
    assert_eq!(h.registry.dependents("COMP1").unwrap(), vec!["MAIN", "NEW_CONFIG"]);
    assert!(h
        .vcs
        .commits()
        .contains(&"NEW_CONFIG modified by client".to_string()));

    let snapshot = h.server.snapshot();
    let id = &snapshot.config("NEW_CONFIG").unwrap().public_id;
    let details = &snapshot.config_details[id];
    let none = details.groups.last().unwrap();
    assert_eq!(none.name, "NONE");
    assert_eq!(none.blocks, vec!["Y"]);
}

#[test]
fn bad_description_leaves_disk_untouched() {
    let mut h = harness();
    let mut tagged = Block::new("Z", "PVZ");
    tagged.component = Some("COMP1".to_string());
    let desc = ConfigDescription {
        name: Some("ALT".to_string()),
        blocks: vec![BlockDescription::new(tagged, "G")],
        ..Default::default()
    };
    assert!(h.server.save_inactive(&desc, false).is_err());
    let alt = h.store.load("ALT", false).unwrap();
    assert!(alt.blocks.is_empty());
    assert_eq!(alt.iocs.len(), 1);
}

#[test]
fn hand_edits_are_reconciled() {
    let mut h = harness();
    h.server.load_config("MAIN").unwrap();
    let reconciler = Reconciler::new(
        h.registry.clone(),
        h.settings.config_dir(),
        h.settings.component_dir(),
    );

    let mut comp = h.store.load("COMP1", true).unwrap();
    comp.meta.description = "edited by hand".to_string();
    h.store.save(&comp, true).unwrap();
    let outcome = reconciler.handle(&WatchEvent::modified(
        h.settings.component_dir().join("COMP1").join("meta.json"),
    ));
    assert!(matches!(outcome, Reconciled::Updated { active: true, .. }));
    let snapshot = h.server.snapshot();
    assert!(snapshot.active_config_changed);
    assert_eq!(
        snapshot.component("COMP1").unwrap().summary.description,
        "edited by hand"
    );

    h.server.acknowledge_active_changed().unwrap();
    assert!(!h.server.snapshot().active_config_changed);

    fs::write(
        h.settings.config_dir().join("ALT").join("iocs.json"),
        "{ not json",
    )
    .unwrap();
    let outcome = reconciler.handle(&WatchEvent::modified(
        h.settings.config_dir().join("ALT").join("iocs.json"),
    ));
    assert!(matches!(outcome, Reconciled::Invalid { .. }));
    assert!(h.registry.contains("ALT", false).unwrap());
    assert!(!h.server.snapshot().active_config_changed);

    let outcome = reconciler.handle(&WatchEvent::deleted(
        h.settings.config_dir().join("MAIN").join("groups.json"),
    ));
    assert_eq!(outcome, Reconciled::Reverted);
    assert_eq!(h.vcs.ops().last(), Some(&VcsOp::RevertToHead));
    assert!(h.server.snapshot().active_config_changed);
}
