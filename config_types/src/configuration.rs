use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::{Block, RunControlSettings};
use crate::error::ModelError;
use crate::group::Group;
use crate::ioc::Ioc;
use crate::metadata::MetaData;
use crate::named::{Named, NamedList};

/// A configuration or component.
///
/// Components are configurations with `is_component` set; they never list
/// components of their own. Dependencies are held by name only, the owning
/// holder loads them separately.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub blocks: NamedList<Block>,
    #[serde(default)]
    pub groups: NamedList<Group>,
    #[serde(default)]
    pub iocs: NamedList<Ioc>,
    /// Names of the components this configuration depends on, in attach order.
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub meta: MetaData,
    #[serde(default)]
    pub is_component: bool,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: MetaData::new(name),
            ..Default::default()
        }
    }

    pub fn component(name: impl Into<String>) -> Self {
        Self {
            is_component: true,
            ..Self::new(name)
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.meta.name = name.into();
    }

    /// Add a block and append it to `group`, creating the group if needed.
    pub fn add_block(&mut self, block: Block, group: &str) -> Result<(), ModelError> {
        if block.name.trim().is_empty() {
            return Err(ModelError::BlankBlockName);
        }
        if self.blocks.contains(&block.name) {
            return Err(ModelError::DuplicateBlock(block.name));
        }

        if !self.groups.contains(group) {
            self.groups.insert(Group::new(group));
        }
        if let Some(grp) = self.groups.get_mut(group) {
            grp.blocks.push(block.name.clone());
        }
        self.blocks.insert(block);
        Ok(())
    }

    /// Add an IOC unless one of the same name is already present.
    pub fn add_ioc(&mut self, ioc: Ioc) -> bool {
        self.iocs.insert_new(ioc)
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.components
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn add_component(&mut self, name: impl Into<String>) -> Result<(), ModelError> {
        let name = name.into();
        if self.has_component(&name) {
            return Err(ModelError::DuplicateComponent(name));
        }
        self.components.push(name);
        Ok(())
    }

    pub fn remove_component(&mut self, name: &str) -> bool {
        let before = self.components.len();
        self.components.retain(|c| !c.eq_ignore_ascii_case(name));
        before != self.components.len()
    }

    /// Tag every block, group and IOC as owned by component `owner`.
    pub fn set_owner(&mut self, owner: &str) {
        for block in self.blocks.iter_mut() {
            block.component = Some(owner.to_string());
        }
        for group in self.groups.iter_mut() {
            group.component = Some(owner.to_string());
        }
        for ioc in self.iocs.iter_mut() {
            ioc.component = Some(owner.to_string());
        }
    }

    pub fn block_names(&self) -> Vec<String> {
        self.blocks.names()
    }

    /// Copy live run-control limits onto native blocks so they are saved.
    ///
    /// Blocks owned by a component are left alone; their limits belong to
    /// the component file.
    pub fn update_runcontrol_settings_for_saving(
        &mut self,
        settings: &BTreeMap<String, RunControlSettings>,
    ) {
        for block in self.blocks.iter_mut().filter(|b| b.component.is_none()) {
            let live = settings
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&block.name))
                .map(|(_, rc)| *rc);
            if let Some(rc) = live {
                block.apply_runcontrol(rc);
            }
        }
    }
}

impl Named for Configuration {
    fn name(&self) -> &str {
        &self.meta.name
    }
}
