use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use config_types::constants::{COMPONENT_DIRECTORY, CONFIG_DIRECTORY, DEFAULT_COMPONENT};
use config_types::Configuration;

use crate::error::{ConfigError, Result};
use crate::ports::ConfigStore;

type StoreKey = (bool, String);

fn key(name: &str, is_component: bool) -> StoreKey {
    (is_component, name.to_ascii_lowercase())
}

/// In-memory ConfigStore for tests.
///
/// Loads return deep copies, so mutating a loaded configuration never
/// changes what is stored.
pub struct MemoryConfigStore {
    inner: RwLock<BTreeMap<StoreKey, Configuration>>,
    read_only: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            read_only: AtomicBool::new(false),
        }
    }

    /// A store that already holds the default component.
    pub fn with_default_component() -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.write() {
            inner.insert(
                key(DEFAULT_COMPONENT, true),
                Configuration::component(DEFAULT_COMPONENT),
            );
        }
        store
    }

    /// While set, every save fails with an I/O error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self, name: &str, is_component: bool) -> Result<Configuration> {
        let store = self.inner.read().map_err(ConfigError::lock)?;
        let mut config = store
            .get(&key(name, is_component))
            .cloned()
            .ok_or_else(|| {
                let kind = if is_component { "component" } else { "configuration" };
                ConfigError::NotFound(format!("{} {}", kind, name))
            })?;
        config.is_component = is_component;
        Ok(config)
    }

    fn save(&self, config: &Configuration, is_component: bool) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("store is read-only, cannot save {}", config.meta.name),
            )));
        }
        let mut store = self.inner.write().map_err(ConfigError::lock)?;
        let mut stored = config.clone();
        stored.is_component = is_component;
        store.insert(key(&config.meta.name, is_component), stored);
        Ok(())
    }

    fn list(&self, is_component: bool) -> Result<Vec<String>> {
        let store = self.inner.read().map_err(ConfigError::lock)?;
        Ok(store
            .iter()
            .filter(|((comp, _), _)| *comp == is_component)
            .map(|(_, config)| config.meta.name.clone())
            .collect())
    }

    fn exists(&self, name: &str, is_component: bool) -> bool {
        self.inner
            .read()
            .map(|store| store.contains_key(&key(name, is_component)))
            .unwrap_or(false)
    }

    fn delete(&self, name: &str, is_component: bool) -> Result<()> {
        let mut store = self.inner.write().map_err(ConfigError::lock)?;
        store.remove(&key(name, is_component));
        Ok(())
    }

    fn path_for(&self, name: &str, is_component: bool) -> PathBuf {
        let dir = if is_component {
            COMPONENT_DIRECTORY
        } else {
            CONFIG_DIRECTORY
        };
        PathBuf::from(dir).join(name)
    }

    fn ensure_default_component(&self) -> Result<()> {
        if !self.exists(DEFAULT_COMPONENT, true) {
            self.save(&Configuration::component(DEFAULT_COMPONENT), true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_types::Block;

    #[test]
    fn load_returns_independent_copy() {
        let store = MemoryConfigStore::new();
        let mut config = Configuration::new("TEST");
        config.add_block(Block::new("A", "PV1"), "G").unwrap();
        store.save(&config, false).unwrap();

        let mut loaded = store.load("test", false).unwrap();
        loaded.blocks.clear();
        assert_eq!(store.load("TEST", false).unwrap().blocks.len(), 1);
    }

    #[test]
    fn namespaces_are_separate() {
        let store = MemoryConfigStore::with_default_component();
        store.save(&Configuration::new("SAME"), false).unwrap();
        assert!(store.exists("SAME", false));
        assert!(!store.exists("SAME", true));
        assert_eq!(store.list(true).unwrap(), vec![DEFAULT_COMPONENT]);
    }

    #[test]
    fn read_only_store_rejects_saves() {
        let store = MemoryConfigStore::new();
        store.set_read_only(true);
        let err = store.save(&Configuration::new("TEST"), false).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(!store.exists("TEST", false));
    }
}
