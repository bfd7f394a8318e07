//! Config server
//!
//! Loads every configuration under the configuration root, activates the
//! last used one and keeps the registry in sync with the filesystem until
//! interrupted.
//!
//! ```bash
//! BLOCKSERVER_CONFIG_ROOT=./settings BLOCKSERVER_PV_PREFIX=IN:DEMO: \
//!     cargo run --bin config_server
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockserver_config::hooks::TracingHooks;
use blockserver_config::ioc_control::{CommandSupervisor, RecordingSupervisor};
use blockserver_config::ports::{ConfigStore, ProcessSupervisor, VersionControl};
use blockserver_config::store::{FileConfigStore, GitVersionControl, NullVersionControl};
use blockserver_config::watcher::{FileWatcherManager, Reconciler};
use blockserver_config::{ConfigListManager, ConfigServer, ServerAdapters, ServerConfig, VcsBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,blockserver_config=debug")),
        )
        .init();

    let settings = ServerConfig::from_env().context("reading configuration")?;
    info!(
        root = %settings.config_root.display(),
        pv_prefix = %settings.pv_prefix,
        vcs = ?settings.vcs,
        "Starting config server"
    );

    let store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::from_config(&settings));
    let vcs: Arc<dyn VersionControl> = match settings.vcs {
        VcsBackend::Git => Arc::new(GitVersionControl::new(&settings.config_root)),
        VcsBackend::None => Arc::new(NullVersionControl),
    };
    let supervisor: Arc<dyn ProcessSupervisor> = match &settings.ioc_command {
        Some(command) => Arc::new(CommandSupervisor::new(command.clone())),
        None => {
            info!("No IOC command configured, IOC requests are only logged");
            Arc::new(RecordingSupervisor::new())
        }
    };
    let hooks = Arc::new(TracingHooks);

    let registry = Arc::new(ConfigListManager::new(
        store.clone(),
        vcs.clone(),
        settings.pv_prefix.clone(),
    ));
    registry.import_configs().context("importing configurations")?;

    let reconciler = Reconciler::new(
        registry.clone(),
        settings.config_dir(),
        settings.component_dir(),
    );
    let watcher = FileWatcherManager::start(reconciler, settings.watch_buffer)
        .context("starting file watcher")?;

    let mut server = ConfigServer::new(
        &settings,
        registry.clone(),
        ServerAdapters {
            store,
            vcs,
            supervisor,
            archiver: hooks.clone(),
            runcontrol: hooks,
            watcher: Arc::new(watcher.switch()),
        },
    );

    let mut snapshots = server.subscribe();
    let publisher = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            info!(
                version = snapshot.version,
                configs = snapshot.configs.len(),
                components = snapshot.components.len(),
                active = %snapshot.active_config,
                active_changed = snapshot.active_config_changed,
                "registry updated"
            );
        }
    });

    server.load_last_config().context("loading last configuration")?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down");

    watcher.shutdown();
    drop(server);
    drop(registry);
    publisher.abort();
    Ok(())
}
