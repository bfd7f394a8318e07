use serde::{Deserialize, Serialize};

use crate::named::Named;

/// A named, ordered list of block names used for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<String>,
    /// Owning component; only used to order component-contributed groups.
    #[serde(default)]
    pub component: Option<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            component: None,
        }
    }

    pub fn with_blocks<I, S>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocks = blocks.into_iter().map(Into::into).collect();
        self
    }

    pub fn contains_block(&self, block: &str) -> bool {
        self.blocks.iter().any(|b| b.eq_ignore_ascii_case(block))
    }

    /// Removes `block` if present. Returns true if it was removed.
    pub fn remove_block(&mut self, block: &str) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| !b.eq_ignore_ascii_case(block));
        before != self.blocks.len()
    }
}

impl Named for Group {
    fn name(&self) -> &str {
        &self.name
    }
}
