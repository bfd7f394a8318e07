use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use config_types::constants::DEFAULT_COMPONENT;
use config_types::{Block, Configuration, Group, Ioc, MetaData, NamedList};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{ConfigError, Result};
use crate::ports::ConfigStore;

const BLOCKS_FILE: &str = "blocks.json";
const GROUPS_FILE: &str = "groups.json";
const IOCS_FILE: &str = "iocs.json";
const COMPONENTS_FILE: &str = "components.json";
const META_FILE: &str = "meta.json";

/// One directory per configuration, one JSON file per section.
///
/// ```text
/// <config_dir>/<name>/blocks.json
///                     groups.json
///                     iocs.json
///                     components.json
///                     meta.json
/// ```
///
/// A missing file is an empty section. A file that does not parse makes the
/// whole load fail with `Validation`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    config_dir: PathBuf,
    component_dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>, component_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            component_dir: component_dir.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.config_dir(), config.component_dir())
    }

    pub fn root(&self, is_component: bool) -> &Path {
        if is_component {
            &self.component_dir
        } else {
            &self.config_dir
        }
    }

    fn entry_dir(&self, name: &str, is_component: bool) -> Result<PathBuf> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\'])
        {
            return Err(ConfigError::Validation(format!(
                "not a valid configuration name: {:?}",
                name
            )));
        }
        Ok(self.root(is_component).join(trimmed))
    }
}

fn read_section<T: DeserializeOwned + Default>(dir: &Path, file: &str, name: &str) -> Result<T> {
    let path = dir.join(file);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(ConfigError::Io(e)),
    };
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text)
        .map_err(|e| ConfigError::Validation(format!("{} in {}: {}", file, name, e)))
}

fn write_section<T: Serialize + ?Sized>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(dir.join(file), text)?;
    Ok(())
}

impl ConfigStore for FileConfigStore {
    fn load(&self, name: &str, is_component: bool) -> Result<Configuration> {
        let dir = self.entry_dir(name, is_component)?;
        if !dir.is_dir() {
            let kind = if is_component { "component" } else { "configuration" };
            return Err(ConfigError::NotFound(format!("{} {}", kind, name)));
        }

        let blocks: Vec<Block> = read_section(&dir, BLOCKS_FILE, name)?;
        let groups: Vec<Group> = read_section(&dir, GROUPS_FILE, name)?;
        let iocs: Vec<Ioc> = read_section(&dir, IOCS_FILE, name)?;
        let components: Vec<String> = read_section(&dir, COMPONENTS_FILE, name)?;
        let meta: MetaData = read_section(&dir, META_FILE, name)?;

        if is_component && !components.is_empty() {
            return Err(ConfigError::Validation(format!(
                "component {} lists components of its own",
                name
            )));
        }

        let block_count = blocks.len();
        let blocks: NamedList<Block> = blocks.into_iter().collect();
        if blocks.len() != block_count {
            return Err(ConfigError::Validation(format!(
                "{} in {}: block names are not unique",
                BLOCKS_FILE, name
            )));
        }

        let mut config = Configuration {
            blocks,
            groups: groups.into_iter().collect(),
            iocs: iocs.into_iter().collect(),
            components: Vec::new(),
            meta,
            is_component,
        };
        for component in components {
            config.add_component(component)?;
        }
        config.set_name(name.trim());

        debug!(name = %name, is_component, "loaded from disk");
        Ok(config)
    }

    fn save(&self, config: &Configuration, is_component: bool) -> Result<()> {
        let name = config.meta.name.as_str();
        let dir = self.entry_dir(name, is_component)?;
        fs::create_dir_all(&dir)?;

        let blocks: Vec<&Block> = config.blocks.iter().collect();
        let groups: Vec<&Group> = config.groups.iter().collect();
        let iocs: Vec<&Ioc> = config.iocs.iter().collect();

        write_section(&dir, BLOCKS_FILE, &blocks)?;
        write_section(&dir, GROUPS_FILE, &groups)?;
        write_section(&dir, IOCS_FILE, &iocs)?;
        write_section(&dir, COMPONENTS_FILE, &config.components)?;
        write_section(&dir, META_FILE, &config.meta)?;

        debug!(name = %name, is_component, path = %dir.display(), "saved to disk");
        Ok(())
    }

    fn list(&self, is_component: bool) -> Result<Vec<String>> {
        let root = self.root(is_component);
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str, is_component: bool) -> bool {
        self.entry_dir(name, is_component)
            .map(|dir| dir.is_dir())
            .unwrap_or(false)
    }

    fn delete(&self, name: &str, is_component: bool) -> Result<()> {
        let dir = self.entry_dir(name, is_component)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    fn path_for(&self, name: &str, is_component: bool) -> PathBuf {
        self.root(is_component).join(name.trim())
    }

    fn ensure_default_component(&self) -> Result<()> {
        if self.exists(DEFAULT_COMPONENT, true) {
            return Ok(());
        }
        info!("creating default component {}", DEFAULT_COMPONENT);
        self.save(&Configuration::component(DEFAULT_COMPONENT), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_types::constants::GRP_NONE;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> FileConfigStore {
        FileConfigStore::new(
            tmp.path().join("configurations"),
            tmp.path().join("components"),
        )
    }

    fn sample() -> Configuration {
        let mut config = Configuration::new("TEST_CONFIG");
        config.add_block(Block::new("A", "PV1"), "GROUP1").unwrap();
        config.add_block(Block::new("B", "PV2"), GRP_NONE).unwrap();
        config.add_ioc(Ioc::new("SIMPLE").with_macro("X", "1"));
        config.add_component("COMP1").unwrap();
        config.meta.description = "a test".to_string();
        config
    }

    #[test]
    fn saved_configuration_loads_back() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let config = sample();
        store.save(&config, false).unwrap();

        let loaded = store.load("TEST_CONFIG", false).unwrap();
        assert_eq!(loaded, config);
        assert!(store.exists("TEST_CONFIG", false));
        assert!(!store.exists("TEST_CONFIG", true));
    }

    #[test]
    fn missing_configuration_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).load("NOPE", false).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn missing_section_files_are_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        fs::create_dir_all(tmp.path().join("configurations").join("BARE")).unwrap();

        let loaded = store.load("BARE", false).unwrap();
        assert!(loaded.blocks.is_empty());
        assert!(loaded.iocs.is_empty());
        assert_eq!(loaded.meta.name, "BARE");
    }

    #[test]
    fn malformed_file_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save(&sample(), false).unwrap();
        let blocks = tmp
            .path()
            .join("configurations")
            .join("TEST_CONFIG")
            .join(BLOCKS_FILE);
        fs::write(&blocks, "{ not json").unwrap();

        let err = store.load("TEST_CONFIG", false).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn component_with_components_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut comp = Configuration::component("COMP1");
        comp.components.push("OTHER".to_string());
        store.save(&comp, true).unwrap();

        let err = store.load("COMP1", true).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn list_returns_directories_only() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save(&Configuration::new("B_CONFIG"), false).unwrap();
        store.save(&Configuration::new("A_CONFIG"), false).unwrap();
        fs::write(tmp.path().join("configurations").join("stray.txt"), "x").unwrap();

        assert_eq!(store.list(false).unwrap(), vec!["A_CONFIG", "B_CONFIG"]);
        assert!(store.list(true).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_directory() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save(&sample(), false).unwrap();
        store.delete("TEST_CONFIG", false).unwrap();
        assert!(!store.exists("TEST_CONFIG", false));
        store.delete("TEST_CONFIG", false).unwrap();
    }

    #[test]
    fn ensure_default_component_creates_once() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.ensure_default_component().unwrap();
        assert!(store.exists(DEFAULT_COMPONENT, true));
        store.ensure_default_component().unwrap();
        assert_eq!(store.list(true).unwrap(), vec![DEFAULT_COMPONENT]);
    }

    #[test]
    fn path_traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).load("../etc", false).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
