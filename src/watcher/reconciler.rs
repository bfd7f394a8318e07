use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::registry::ConfigListManager;
use crate::watcher::events::{WatchEvent, WatchEventKind};

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Outside the trees, or a file at the root of a tree.
    Ignored,
    /// Reloaded and re-registered. `active` is set if it belongs to the
    /// active configuration.
    Updated {
        name: String,
        is_component: bool,
        active: bool,
    },
    /// Could not be loaded; the registry keeps its last good entry.
    Invalid { name: String, is_component: bool },
    /// A file was deleted by hand and the tree was reverted.
    Reverted,
}

/// Folds out-of-band filesystem edits back into the registry.
pub struct Reconciler {
    registry: Arc<ConfigListManager>,
    config_dir: PathBuf,
    component_dir: PathBuf,
}

impl Reconciler {
    pub fn new(
        registry: Arc<ConfigListManager>,
        config_dir: impl Into<PathBuf>,
        component_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            config_dir: config_dir.into(),
            component_dir: component_dir.into(),
        }
    }

    pub fn roots(&self) -> [&Path; 2] {
        [&self.config_dir, &self.component_dir]
    }

    /// Path segments below the matching tree, and whether it is the
    /// component tree.
    fn split(&self, path: &Path) -> Option<(Vec<String>, bool)> {
        let (rel, is_component) = match path.strip_prefix(&self.config_dir) {
            Ok(rel) => (rel, false),
            Err(_) => (path.strip_prefix(&self.component_dir).ok()?, true),
        };
        let segments: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some((segments, is_component))
    }

    pub fn handle(&self, event: &WatchEvent) -> Reconciled {
        let Some((segments, is_component)) = self.split(&event.path) else {
            debug!(path = %event.path.display(), "event outside watched trees");
            return Reconciled::Ignored;
        };
        match event.kind {
            WatchEventKind::Modified => self.on_modified(&segments, is_component),
            WatchEventKind::Deleted => self.on_deleted(&segments, is_component),
        }
    }

    fn on_modified(&self, segments: &[String], is_component: bool) -> Reconciled {
        if segments.len() < 2 {
            return Reconciled::Ignored;
        }
        let name = segments[0].clone();

        let holder = match self.registry.load_holder(&name, is_component) {
            Ok(holder) => holder,
            Err(e) => {
                info!(name = %name, is_component, error = %e, "File Watcher, loading config");
                if let Err(e) = self.registry.flag_if_active(&name, is_component) {
                    warn!(error = %e, "unable to flag active configuration");
                }
                return Reconciled::Invalid { name, is_component };
            }
        };

        match self.registry.update(&holder, is_component) {
            Ok(active) => Reconciled::Updated {
                name: holder.name().to_string(),
                is_component,
                active,
            },
            Err(e) => {
                warn!(name = %name, error = %e, "unable to update registry");
                Reconciled::Invalid { name, is_component }
            }
        }
    }

    /// Deleting files by hand is not supported: put them back.
    fn on_deleted(&self, segments: &[String], is_component: bool) -> Reconciled {
        info!(path = %segments.join("/"), is_component, "file deleted, reverting from version control");
        self.registry.recover_from_version_control();
        if let Some(name) = segments.first() {
            if let Err(e) = self.registry.flag_if_active(name, is_component) {
                warn!(error = %e, "unable to flag active configuration");
            }
        }
        Reconciled::Reverted
    }
}
